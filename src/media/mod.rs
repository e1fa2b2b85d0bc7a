use crate::cache::{CacheKey, CacheStore};
use crate::error::{MediaError, PipelineError};
use crate::job::{CancellationToken, MediaAsset, MediaKind, Orientation};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub mod filter;
pub mod pexels;
pub mod pixabay;

pub use filter::{ContentFilter, Rejection, Verdict};

/// An unfetched search result, pending filtering. Carries everything the
/// content filter and the orientation ranking need.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub provider: String,
    pub id: String,
    pub url: String,
    pub description: String,
    pub tags: Vec<String>,
    pub attribution: String,
    pub width: u32,
    pub height: u32,
    pub kind: MediaKind,
}

impl MediaCandidate {
    pub fn orientation(&self) -> Orientation {
        Orientation::classify(self.width, self.height)
    }

    /// The combined text the content filter evaluates.
    pub fn combined_text(&self) -> String {
        let mut parts = vec![self.description.clone()];
        parts.extend(self.tags.iter().cloned());
        parts.push(self.attribution.clone());
        parts.join(" ")
    }
}

/// One stock-media source. `search` returns candidates in provider
/// relevance order; `fetch` downloads raw bytes, leaving storage to the
/// acquisition layer so every download goes through the shared cache.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        max_results: usize,
    ) -> Result<Vec<MediaCandidate>, MediaError>;

    async fn fetch(&self, candidate: &MediaCandidate) -> Result<Vec<u8>, MediaError>;
}

/// Acquisition stage: search, filter, rank, fetch, cache. One slot maps to
/// one sentence; its search-term list is walked until a term yields a
/// usable asset, else the slot degrades to `None`.
pub struct MediaAcquirer {
    provider: Arc<dyn MediaProvider>,
    filter: Arc<ContentFilter>,
    cache: Arc<CacheStore>,
    call_timeout: Duration,
}

impl MediaAcquirer {
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        filter: Arc<ContentFilter>,
        cache: Arc<CacheStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            filter,
            cache,
            call_timeout,
        }
    }

    /// Fills one media slot. Tries each term in order; per term, requests
    /// twice `max_results` so filtering cannot starve the slot, rejects
    /// filtered candidates into the rejection log, ranks survivors by
    /// orientation match (provider relevance order within each band), and
    /// fetches the first that downloads cleanly. The cancellation token is
    /// checked before every term, so a cancelled job stops searching
    /// mid-walk. An exhausted term list degrades the slot to `Ok(None)`.
    pub async fn acquire_slot(
        &self,
        terms: &[String],
        orientation: Orientation,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<MediaAsset>, PipelineError> {
        for term in terms {
            cancel.checkpoint()?;
            match self.acquire_for_term(term, orientation, max_results).await {
                Ok(Some(asset)) => return Ok(Some(asset)),
                Ok(None) => {
                    debug!("no usable candidate for term '{}'", term);
                }
                Err(e) => {
                    warn!("media search for '{}' failed: {}", term, e);
                }
            }
        }
        Ok(None)
    }

    async fn acquire_for_term(
        &self,
        term: &str,
        orientation: Orientation,
        max_results: usize,
    ) -> Result<Option<MediaAsset>, MediaError> {
        let attempt = tokio::time::timeout(
            self.call_timeout,
            self.provider.search(term, orientation, max_results * 2),
        )
        .await;
        let candidates = match attempt {
            Ok(r) => r?,
            Err(_) => {
                return Err(MediaError::ProviderUnavailable(format!(
                    "search timed out after {:?}",
                    self.call_timeout
                )))
            }
        };

        let mut accepted: Vec<MediaCandidate> = candidates
            .into_iter()
            .filter(|c| self.filter.check_and_log(c, term))
            .collect();

        // Stable sort keeps provider relevance order within each band;
        // exact orientation matches rank first.
        accepted.sort_by_key(|c| c.orientation() != orientation);

        for candidate in accepted {
            match self.fetch_cached(&candidate).await {
                Ok(path) => {
                    info!(
                        "acquired {} asset {} for term '{}'",
                        candidate.provider, candidate.id, term
                    );
                    return Ok(Some(MediaAsset {
                        provider: candidate.provider.clone(),
                        id: candidate.id.clone(),
                        url: candidate.url.clone(),
                        local_path: path,
                        orientation: candidate.orientation(),
                        kind: candidate.kind,
                    }));
                }
                Err(e) => {
                    warn!(
                        "fetch of candidate {} failed, trying next: {}",
                        candidate.id, e
                    );
                }
            }
        }
        Ok(None)
    }

    /// Downloads are keyed by URL: a previously fetched asset is reused
    /// without touching the network.
    async fn fetch_cached(&self, candidate: &MediaCandidate) -> Result<std::path::PathBuf, MediaError> {
        let key = CacheKey::of(&["media", &candidate.url]);
        let ext = extension_of(&candidate.url);

        if let Some(path) = self.cache.get(&key, &ext) {
            debug!("media cache hit for {}", candidate.url);
            return Ok(path);
        }

        let attempt =
            tokio::time::timeout(self.call_timeout, self.provider.fetch(candidate)).await;
        let bytes = match attempt {
            Ok(r) => r?,
            Err(_) => {
                return Err(MediaError::ProviderUnavailable(format!(
                    "download timed out after {:?}",
                    self.call_timeout
                )))
            }
        };

        self.cache
            .put(&key, &ext, &bytes)
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))
    }
}

/// Creates the configured stock-media source.
pub fn create_provider(
    settings: &crate::config::MediaSettings,
) -> anyhow::Result<Arc<dyn MediaProvider>> {
    match settings.provider.as_str() {
        "pexels" => Ok(Arc::new(pexels::PexelsProvider::from_env(
            settings.media_type,
        )?)),
        "pixabay" if settings.media_type == MediaKind::Video => {
            anyhow::bail!("the pixabay adapter serves photos only")
        }
        "pixabay" => Ok(Arc::new(pixabay::PixabayProvider::from_env()?)),
        other => anyhow::bail!("unknown media provider: {}", other),
    }
}

/// File extension from a URL path, defaulting to jpg for extension-less
/// CDN links.
fn extension_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            std::path::Path::new(u.path())
                .extension()
                .map(|e| e.to_string_lossy().to_string())
        })
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "jpg".to_string())
}
