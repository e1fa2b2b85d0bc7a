use super::{ProviderCaps, SpeechProvider, SpeechRequest};
use crate::error::SpeechError;
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

const API_URL: &str = "https://api.airforce/get-audio";

/// api.airforce adapter: a plain GET that streams back audio bytes. Supports
/// a playback-rate parameter but has no style/emotion control.
pub struct AirforceProvider {
    client: reqwest::Client,
}

impl AirforceProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for AirforceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechProvider for AirforceProvider {
    fn name(&self) -> &'static str {
        "airforce"
    }

    fn caps(&self) -> ProviderCaps {
        ProviderCaps {
            rate_range: (0.5, 2.0),
            supports_style: false,
        }
    }

    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>, SpeechError> {
        let mut url = Url::parse(API_URL)
            .map_err(|e| SpeechError::ProviderUnavailable(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("text", &req.text)
            .append_pair("voice", &req.voice_id)
            .append_pair("rate", &format!("{:.2}", req.rate));

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SpeechError::ProviderUnavailable(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| SpeechError::ProviderUnavailable(e.to_string()))?;
                if bytes.is_empty() {
                    // The endpoint answers 200 with an empty body for
                    // declined content.
                    return Err(SpeechError::SynthesisRejected(
                        "provider returned no audio".to_string(),
                    ));
                }
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(SpeechError::VoiceNotFound(req.voice_id.clone())),
            s => Err(SpeechError::ProviderUnavailable(format!("status {}", s))),
        }
    }
}
