use super::MediaCandidate;
use log::{info, warn};
use std::sync::Mutex;

/// Filtering outcome for one candidate. Rejection is an expected result,
/// not an error; rejected candidates are logged and never flow downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { phrase: String },
}

/// One rejection-log record, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub provider: String,
    pub candidate_id: String,
    pub query: String,
    pub phrase: String,
}

/// Case-insensitive substring matcher over a candidate's combined textual
/// metadata (description, tags, attribution). Loaded once per process and
/// shared across jobs.
pub struct ContentFilter {
    phrases: Vec<String>,
    log: Mutex<Vec<Rejection>>,
}

impl ContentFilter {
    pub fn new(phrases: Vec<String>) -> Self {
        if phrases.is_empty() {
            warn!("content filter configured with no rejection phrases");
        }
        Self {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn evaluate(&self, candidate: &MediaCandidate) -> Verdict {
        let haystack = candidate.combined_text().to_lowercase();
        for phrase in &self.phrases {
            if haystack.contains(phrase.as_str()) {
                return Verdict::Rejected {
                    phrase: phrase.clone(),
                };
            }
        }
        Verdict::Accepted
    }

    /// Evaluates and records rejections. Returns `true` when the candidate
    /// is usable.
    pub fn check_and_log(&self, candidate: &MediaCandidate, query: &str) -> bool {
        match self.evaluate(candidate) {
            Verdict::Accepted => true,
            Verdict::Rejected { phrase } => {
                info!(
                    "rejected candidate {} from {} (matched '{}')",
                    candidate.id, candidate.provider, phrase
                );
                let mut log = self.log.lock().expect("rejection log poisoned");
                log.push(Rejection {
                    provider: candidate.provider.clone(),
                    candidate_id: candidate.id.clone(),
                    query: query.to_string(),
                    phrase,
                });
                false
            }
        }
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.log.lock().expect("rejection log poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(description: &str, tags: &[&str], attribution: &str) -> MediaCandidate {
        MediaCandidate {
            provider: "mock".to_string(),
            id: "42".to_string(),
            url: "https://example.com/a.jpg".to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            attribution: attribution.to_string(),
            width: 1080,
            height: 1920,
            kind: crate::job::MediaKind::Photo,
        }
    }

    #[test]
    fn test_description_match_rejects_and_logs_phrase() {
        let filter = ContentFilter::new(vec!["fight".to_string()]);
        let c = candidate("two people fighting on a street", &[], "someone");

        assert!(!filter.check_and_log(&c, "street"));

        let log = filter.rejections();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].phrase, "fight");
        assert_eq!(log[0].candidate_id, "42");
        assert_eq!(log[0].query, "street");
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let filter = ContentFilter::new(vec!["Violence".to_string()]);
        let c = candidate("stock VIOLENCE footage", &[], "");
        assert_eq!(
            filter.evaluate(&c),
            Verdict::Rejected {
                phrase: "violence".to_string()
            }
        );
    }

    #[test]
    fn test_tags_and_attribution_are_checked() {
        let filter = ContentFilter::new(vec!["occult".to_string()]);

        let by_tag = candidate("forest at dusk", &["dark", "occult"], "");
        assert!(matches!(filter.evaluate(&by_tag), Verdict::Rejected { .. }));

        let by_attribution = candidate("forest at dusk", &[], "occult archive");
        assert!(matches!(
            filter.evaluate(&by_attribution),
            Verdict::Rejected { .. }
        ));
    }

    #[test]
    fn test_clean_candidate_accepted() {
        let filter = ContentFilter::new(vec!["fight".to_string(), "prison".to_string()]);
        let c = candidate("sunrise over calm water", &["nature"], "a photographer");
        assert_eq!(filter.evaluate(&c), Verdict::Accepted);
        assert!(filter.check_and_log(&c, "sunrise"));
        assert!(filter.rejections().is_empty());
    }
}
