use crate::cache::{CacheKey, CacheStore};
use crate::error::{PipelineError, SpeechError};
use crate::job::SpeechSegment;
use crate::script::ScriptSentence;
use crate::utils::audio::wav_duration_secs;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub mod airforce;
pub mod elevenlabs;

/// What a provider actually supports. Parameters outside these capabilities
/// are clamped or dropped by the synthesizer and logged, never errored on.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCaps {
    pub rate_range: (f32, f32),
    pub supports_style: bool,
}

/// A fully resolved synthesis request, after capability adjustment.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub rate: f32,
    pub style: Option<String>,
}

/// One TTS backend. Implementations return WAV bytes; duration measurement
/// and caching live above this boundary.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn caps(&self) -> ProviderCaps;
    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>, SpeechError>;
}

/// Fallback-chain synthesizer with a content-addressed cache in front of
/// every provider attempt. Synthesizing identical input twice never
/// re-invokes a provider and always yields byte-identical audio.
pub struct SpeechSynthesizer {
    chain: Vec<Arc<dyn SpeechProvider>>,
    cache: Arc<CacheStore>,
    call_timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        chain: Vec<Arc<dyn SpeechProvider>>,
        cache: Arc<CacheStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            call_timeout,
        }
    }

    /// Synthesizes one sentence, walking the provider chain in priority
    /// order. Each attempt is cache-checked first; a transient failure or
    /// timeout moves to the next provider; `VoiceNotFound` and
    /// `SynthesisRejected` also move on but are never retried against the
    /// same provider. Exhausting the chain is job-fatal.
    pub async fn synthesize(
        &self,
        sentence: &ScriptSentence,
        voice: &str,
        rate: f32,
        style: Option<&str>,
    ) -> Result<SpeechSegment, PipelineError> {
        let normalized = normalize_text(&sentence.text);
        let mut last_error = SpeechError::ProviderUnavailable("no providers configured".into());

        for provider in &self.chain {
            let req = self.adjusted_request(provider.as_ref(), &normalized, voice, rate, style);
            let key = speech_cache_key(provider.name(), &req);

            if let Some(path) = self.cache.get(&key, "wav") {
                debug!(
                    "speech cache hit for sentence {} via {}",
                    sentence.index,
                    provider.name()
                );
                let bytes = std::fs::read(&path)?;
                let duration = wav_duration_secs(&bytes)
                    .map_err(|e| PipelineError::Audio(e.to_string()))?;
                return Ok(SpeechSegment {
                    sentence_index: sentence.index,
                    text: sentence.text.clone(),
                    provider: provider.name().to_string(),
                    voice_id: req.voice_id,
                    duration_secs: duration,
                    audio_path: path,
                });
            }

            let attempt = tokio::time::timeout(self.call_timeout, provider.synthesize(&req)).await;
            let result = match attempt {
                Ok(r) => r,
                Err(_) => Err(SpeechError::ProviderUnavailable(format!(
                    "timed out after {:?}",
                    self.call_timeout
                ))),
            };

            match result {
                Ok(bytes) => {
                    let duration = wav_duration_secs(&bytes)
                        .map_err(|e| PipelineError::Audio(e.to_string()))?;
                    let path = self
                        .cache
                        .put(&key, "wav", &bytes)
                        .map_err(|e| PipelineError::Internal(e.to_string()))?;
                    info!(
                        "synthesized sentence {} via {} ({:.2}s)",
                        sentence.index,
                        provider.name(),
                        duration
                    );
                    return Ok(SpeechSegment {
                        sentence_index: sentence.index,
                        text: sentence.text.clone(),
                        provider: provider.name().to_string(),
                        voice_id: req.voice_id,
                        duration_secs: duration,
                        audio_path: path,
                    });
                }
                Err(e) => {
                    warn!(
                        "provider {} failed for sentence {}: {}",
                        provider.name(),
                        sentence.index,
                        e
                    );
                    last_error = e;
                }
            }
        }

        Err(PipelineError::SynthesisFailed {
            index: sentence.index,
            source: last_error,
        })
    }

    /// Clamps the rate into the provider's supported range and drops the
    /// style parameter when unsupported. Both adjustments are logged.
    fn adjusted_request(
        &self,
        provider: &dyn SpeechProvider,
        normalized_text: &str,
        voice: &str,
        rate: f32,
        style: Option<&str>,
    ) -> SpeechRequest {
        let caps = provider.caps();
        let (min, max) = caps.rate_range;
        let clamped = rate.clamp(min, max);
        if (clamped - rate).abs() > f32::EPSILON {
            info!(
                "provider {} does not support rate {}; clamped to {}",
                provider.name(),
                rate,
                clamped
            );
        }

        let style = match (caps.supports_style, style) {
            (true, Some(s)) => Some(s.to_string()),
            (false, Some(s)) => {
                info!(
                    "provider {} does not support style '{}'; dropping",
                    provider.name(),
                    s
                );
                None
            }
            _ => None,
        };

        SpeechRequest {
            text: normalized_text.to_string(),
            voice_id: voice.to_string(),
            rate: clamped,
            style,
        }
    }
}

/// Builds the fallback chain from the configured provider names, in
/// priority order.
pub fn build_chain(
    settings: &crate::config::SpeechSettings,
) -> Result<Vec<Arc<dyn SpeechProvider>>> {
    let mut chain: Vec<Arc<dyn SpeechProvider>> = Vec::new();
    for name in &settings.providers {
        match name.as_str() {
            "elevenlabs" => chain.push(Arc::new(elevenlabs::ElevenLabsProvider::from_env()?)),
            "airforce" => chain.push(Arc::new(airforce::AirforceProvider::new())),
            other => anyhow::bail!("unknown speech provider: {}", other),
        }
    }
    Ok(chain)
}

/// Whitespace-normalized text, so formatting differences in the incoming
/// script do not defeat the cache.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn speech_cache_key(provider: &str, req: &SpeechRequest) -> CacheKey {
    // Rate is hashed at milli precision so float formatting cannot split
    // otherwise identical keys.
    let rate_millis = (req.rate * 1000.0).round() as i64;
    CacheKey::of(&[
        provider,
        &req.voice_id,
        &rate_millis.to_string(),
        &req.text,
    ])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::audio::test_wav;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable mock provider with a call counter, so tests can assert
    /// that cache hits perform zero provider calls.
    pub(crate) struct MockProvider {
        pub name: &'static str,
        pub duration: f64,
        pub fail_with: Option<fn() -> SpeechError>,
        pub calls: AtomicUsize,
        pub caps: ProviderCaps,
    }

    impl MockProvider {
        pub(crate) fn ok(name: &'static str, duration: f64) -> Self {
            Self {
                name,
                duration,
                fail_with: None,
                calls: AtomicUsize::new(0),
                caps: ProviderCaps {
                    rate_range: (0.5, 2.0),
                    supports_style: true,
                },
            }
        }

        pub(crate) fn failing(name: &'static str, fail_with: fn() -> SpeechError) -> Self {
            Self {
                name,
                duration: 0.0,
                fail_with: Some(fail_with),
                calls: AtomicUsize::new(0),
                caps: ProviderCaps {
                    rate_range: (0.5, 2.0),
                    supports_style: true,
                },
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechProvider for MockProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn caps(&self) -> ProviderCaps {
            self.caps
        }

        async fn synthesize(&self, _req: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(test_wav(self.duration)),
            }
        }
    }

    fn sentence(index: usize, text: &str) -> ScriptSentence {
        ScriptSentence {
            index,
            text: text.to_string(),
        }
    }

    fn store() -> (tempfile::TempDir, Arc<CacheStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::new(dir.path().join("speech")).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_second_call_hits_cache_with_zero_provider_calls() {
        let (_dir, cache) = store();
        let provider = Arc::new(MockProvider::ok("mock", 1.2));
        let synth = SpeechSynthesizer::new(
            vec![provider.clone()],
            cache,
            Duration::from_secs(5),
        );

        let s = sentence(0, "Hello world.");
        let first = synth.synthesize(&s, "ellie", 1.0, None).await.unwrap();
        assert_eq!(provider.call_count(), 1);

        let second = synth.synthesize(&s, "ellie", 1.0, None).await.unwrap();
        assert_eq!(provider.call_count(), 1, "cache hit must not re-invoke");
        assert_eq!(first.audio_path, second.audio_path);
        assert_eq!(
            std::fs::read(&first.audio_path).unwrap(),
            std::fs::read(&second.audio_path).unwrap()
        );
        assert!((second.duration_secs - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_whitespace_differences_share_cache_entry() {
        let (_dir, cache) = store();
        let provider = Arc::new(MockProvider::ok("mock", 0.5));
        let synth = SpeechSynthesizer::new(
            vec![provider.clone()],
            cache,
            Duration::from_secs(5),
        );

        synth
            .synthesize(&sentence(0, "Hello   world."), "v", 1.0, None)
            .await
            .unwrap();
        synth
            .synthesize(&sentence(0, "  Hello world. "), "v", 1.0, None)
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_to_secondary_records_provider() {
        let (_dir, cache) = store();
        let primary = Arc::new(MockProvider::failing("primary", || {
            SpeechError::ProviderUnavailable("down".into())
        }));
        let secondary = Arc::new(MockProvider::ok("secondary", 0.8));
        let synth = SpeechSynthesizer::new(
            vec![primary.clone(), secondary.clone()],
            cache,
            Duration::from_secs(5),
        );

        let segment = synth
            .synthesize(&sentence(3, "text"), "v", 1.0, None)
            .await
            .unwrap();
        assert_eq!(segment.provider, "secondary");
        assert_eq!(segment.sentence_index, 3);
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_voice_not_found_moves_chain_without_retry() {
        let (_dir, cache) = store();
        let primary = Arc::new(MockProvider::failing("primary", || {
            SpeechError::VoiceNotFound("ghost".into())
        }));
        let secondary = Arc::new(MockProvider::ok("secondary", 0.4));
        let synth = SpeechSynthesizer::new(
            vec![primary.clone(), secondary],
            cache,
            Duration::from_secs(5),
        );

        synth
            .synthesize(&sentence(0, "text"), "ghost", 1.0, None)
            .await
            .unwrap();
        assert_eq!(primary.call_count(), 1, "non-recoverable, no retry");
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_job_fatal() {
        let (_dir, cache) = store();
        let a = Arc::new(MockProvider::failing("a", || {
            SpeechError::ProviderUnavailable("down".into())
        }));
        let b = Arc::new(MockProvider::failing("b", || {
            SpeechError::SynthesisRejected("nope".into())
        }));
        let synth = SpeechSynthesizer::new(vec![a, b], cache, Duration::from_secs(5));

        let err = synth
            .synthesize(&sentence(7, "text"), "v", 1.0, None)
            .await
            .unwrap_err();
        match err {
            PipelineError::SynthesisFailed { index, source } => {
                assert_eq!(index, 7);
                assert!(matches!(source, SpeechError::SynthesisRejected(_)));
            }
            other => panic!("expected SynthesisFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_rate_and_style_are_adjusted() {
        let (_dir, cache) = store();
        let mut provider = MockProvider::ok("rigid", 0.3);
        provider.caps = ProviderCaps {
            rate_range: (1.0, 1.0),
            supports_style: false,
        };
        let provider = Arc::new(provider);
        let synth = SpeechSynthesizer::new(
            vec![provider.clone()],
            cache.clone(),
            Duration::from_secs(5),
        );

        // Out-of-range rate and a style the provider cannot honor: the call
        // still succeeds, keyed by the adjusted parameters.
        synth
            .synthesize(&sentence(0, "text"), "v", 1.7, Some("cheerful"))
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);

        // A second call with a different out-of-range rate clamps to the
        // same key and hits the cache.
        synth
            .synthesize(&sentence(0, "text"), "v", 1.4, Some("sad"))
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);
    }
}
