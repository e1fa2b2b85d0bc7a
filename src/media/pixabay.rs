use super::{MediaCandidate, MediaProvider};
use crate::error::MediaError;
use crate::job::{MediaKind, Orientation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

const API_URL: &str = "https://pixabay.com/api/";

pub struct PixabayProvider {
    client: reqwest::Client,
    api_key: String,
}

impl PixabayProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PIXABAY_API_KEY").context("PIXABAY_API_KEY not set")?;
        Ok(Self::new(api_key))
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    id: u64,
    #[serde(default)]
    tags: String,
    #[serde(rename = "largeImageURL")]
    large_image_url: String,
    #[serde(rename = "imageWidth")]
    image_width: u32,
    #[serde(rename = "imageHeight")]
    image_height: u32,
    #[serde(default)]
    user: String,
}

/// Pixabay only distinguishes horizontal and vertical; square maps to "all".
fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "horizontal",
        Orientation::Portrait => "vertical",
        Orientation::Square => "all",
    }
}

#[async_trait]
impl MediaProvider for PixabayProvider {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        max_results: usize,
    ) -> Result<Vec<MediaCandidate>, MediaError> {
        let resp = self
            .client
            .get(API_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("per_page", &max_results.to_string()),
                ("orientation", orientation_param(orientation)),
                ("image_type", "photo"),
                ("safesearch", "true"),
            ])
            .send()
            .await
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MediaError::ProviderUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))?;

        if body.hits.is_empty() {
            return Err(MediaError::NoResults(query.to_string()));
        }

        Ok(body
            .hits
            .into_iter()
            .map(|h| MediaCandidate {
                provider: "pixabay".to_string(),
                id: h.id.to_string(),
                url: h.large_image_url,
                description: String::new(),
                tags: h.tags.split(',').map(|t| t.trim().to_string()).collect(),
                attribution: h.user,
                width: h.image_width,
                height: h.image_height,
                kind: MediaKind::Photo,
            })
            .collect())
    }

    async fn fetch(&self, candidate: &MediaCandidate) -> Result<Vec<u8>, MediaError> {
        let resp = self
            .client
            .get(&candidate.url)
            .send()
            .await
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MediaError::ProviderUnavailable(format!(
                "download status {}",
                resp.status()
            )));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_parses_and_tags_split() {
        let body = r#"{
            "total": 1,
            "hits": [
                {
                    "id": 987,
                    "tags": "nature, forest, morning light",
                    "largeImageURL": "https://pixabay.com/get/xyz_1280.jpg",
                    "imageWidth": 1280,
                    "imageHeight": 1920,
                    "user": "someone"
                }
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        let hit = &parsed.hits[0];
        assert_eq!(hit.id, 987);
        let tags: Vec<String> = hit.tags.split(',').map(|t| t.trim().to_string()).collect();
        assert_eq!(tags, vec!["nature", "forest", "morning light"]);
    }
}
