use super::{ProviderCaps, SpeechProvider, SpeechRequest};
use crate::error::SpeechError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_multilingual_v2";

/// ElevenLabs adapter. No playback-rate control on the wire, so the rate
/// range is pinned to 1.0; the style slider maps onto `voice_settings.style`.
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
}

impl ElevenLabsProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("ELEVENLABS_API_KEY").context("ELEVENLABS_API_KEY not set")?;
        Ok(Self::new(api_key))
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn caps(&self) -> ProviderCaps {
        ProviderCaps {
            rate_range: (1.0, 1.0),
            supports_style: true,
        }
    }

    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        let url = format!(
            "{}/text-to-speech/{}?output_format=wav",
            API_BASE, req.voice_id
        );
        let body = SynthesisBody {
            text: &req.text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.71,
                similarity_boost: 0.5,
                style: if req.style.is_some() { 0.5 } else { 0.0 },
                use_speaker_boost: true,
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::ProviderUnavailable(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| SpeechError::ProviderUnavailable(e.to_string())),
            StatusCode::NOT_FOUND => Err(SpeechError::VoiceNotFound(req.voice_id.clone())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = resp.text().await.unwrap_or_default();
                Err(SpeechError::SynthesisRejected(detail))
            }
            s => Err(SpeechError::ProviderUnavailable(format!("status {}", s))),
        }
    }
}
