//! Audio-to-caption synchronization. Pure functions: cue timing is derived
//! entirely from measured segment durations, so captions cannot drift from
//! narration regardless of text length.

use crate::job::{CaptionCue, SpeechSegment};

/// One cue per sentence. Cue `i` starts at the cumulative duration of
/// segments `0..i` and ends at start plus segment `i`'s duration. Cue count
/// always equals segment count; zero-duration segments yield zero-duration
/// cues so indices stay aligned downstream.
pub fn synchronize(segments: &[SpeechSegment]) -> Vec<CaptionCue> {
    let mut cues = Vec::with_capacity(segments.len());
    let mut clock = 0.0f64;

    for segment in segments {
        let start = clock;
        clock += segment.duration_secs;
        cues.push(CaptionCue {
            start_secs: start,
            end_secs: clock,
            text: segment.text.clone(),
        });
    }
    cues
}

/// One cue per word. A sentence's measured duration is distributed across
/// its words proportionally to character length. This is a deterministic
/// approximation: true phoneme timing would need provider-side timestamps,
/// which none of the supported providers expose.
pub fn synchronize_words(segments: &[SpeechSegment]) -> Vec<CaptionCue> {
    let mut cues = Vec::new();
    let mut clock = 0.0f64;

    for segment in segments {
        let words: Vec<&str> = segment.text.split_whitespace().collect();
        let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();

        if words.is_empty() || total_chars == 0 {
            // Keep a degenerate cue so cue/sentence alignment survives.
            cues.push(CaptionCue {
                start_secs: clock,
                end_secs: clock + segment.duration_secs,
                text: segment.text.clone(),
            });
            clock += segment.duration_secs;
            continue;
        }

        let sentence_end = clock + segment.duration_secs;
        for (i, word) in words.iter().enumerate() {
            let end = if i == words.len() - 1 {
                // Last word absorbs rounding drift so the sentence boundary
                // is exact.
                sentence_end
            } else {
                let share = word.chars().count() as f64 / total_chars as f64;
                clock + segment.duration_secs * share
            };
            cues.push(CaptionCue {
                start_secs: clock,
                end_secs: end,
                text: (*word).to_string(),
            });
            clock = end;
        }
        clock = sentence_end;
    }
    cues
}

/// Formats cues as an SRT document for subtitle burn-in.
pub fn to_srt(cues: &[CaptionCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(cue.start_secs),
            format_srt_time(cue.end_secs),
            cue.text
        ));
    }
    out
}

fn format_srt_time(secs: f64) -> String {
    let total_millis = (secs * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn segment(index: usize, text: &str, duration: f64) -> SpeechSegment {
        SpeechSegment {
            sentence_index: index,
            text: text.to_string(),
            provider: "mock".to_string(),
            voice_id: "v".to_string(),
            duration_secs: duration,
            audio_path: PathBuf::from(format!("chunk_{index:04}.wav")),
        }
    }

    #[test]
    fn test_sentence_cues_follow_measured_durations() {
        let segments = vec![
            segment(0, "Hello world.", 1.20),
            segment(1, "This is a test.", 2.05),
        ];
        let cues = synchronize(&segments);

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_secs, 0.0);
        assert!((cues[0].end_secs - 1.20).abs() < 1e-9);
        assert_eq!(cues[0].text, "Hello world.");
        assert!((cues[1].start_secs - 1.20).abs() < 1e-9);
        assert!((cues[1].end_secs - 3.25).abs() < 1e-9);
        assert_eq!(cues[1].text, "This is a test.");
    }

    #[test]
    fn test_narration_and_captions_end_together() {
        let segments = vec![
            segment(0, "a", 0.7),
            segment(1, "b", 1.3),
            segment(2, "c", 0.25),
        ];
        let total: f64 = segments.iter().map(|s| s.duration_secs).sum();
        let cues = synchronize(&segments);
        assert!((cues.last().map(|c| c.end_secs).unwrap_or(0.0) - total).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_cue_preserved() {
        let segments = vec![segment(0, "silent", 0.0), segment(1, "spoken", 1.0)];
        let cues = synchronize(&segments);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_secs, cues[0].end_secs);
        assert_eq!(cues[1].start_secs, 0.0);
    }

    #[test]
    fn test_word_cues_cover_sentence_exactly() {
        let segments = vec![segment(0, "Imagine waking up", 1.0)];
        let cues = synchronize_words(&segments);

        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start_secs, 0.0);
        assert!((cues.last().unwrap().end_secs - 1.0).abs() < 1e-12);

        // Monotone, abutting spans.
        for pair in cues.windows(2) {
            assert_eq!(pair[0].end_secs, pair[1].start_secs);
        }

        // "Imagine" (7 chars of 15) gets the longest share.
        assert!(cues[0].end_secs - cues[0].start_secs > cues[1].end_secs - cues[1].start_secs);
    }

    #[test]
    fn test_word_cue_count_spans_sentences() {
        let segments = vec![
            segment(0, "Hello world.", 1.2),
            segment(1, "This is a test.", 2.05),
        ];
        let cues = synchronize_words(&segments);
        assert_eq!(cues.len(), 6);
        assert!((cues.last().unwrap().end_secs - 3.25).abs() < 1e-9);
        // Sentence boundary is exact.
        assert!((cues[1].end_secs - 1.2).abs() < 1e-12);
        assert!((cues[2].start_secs - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_srt_formatting() {
        let segments = vec![
            segment(0, "Hello world.", 1.2),
            segment(1, "This is a test.", 2.05),
        ];
        let srt = to_srt(&synchronize(&segments));
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,200\nHello world.\n"));
        assert!(srt.contains("2\n00:00:01,200 --> 00:00:03,250\nThis is a test.\n"));
    }

    #[test]
    fn test_srt_time_rollover() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(61.5), "00:01:01,500");
        assert_eq!(format_srt_time(3661.007), "01:01:01,007");
    }
}
