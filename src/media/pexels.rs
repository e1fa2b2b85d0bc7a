use super::{MediaCandidate, MediaProvider};
use crate::error::MediaError;
use crate::job::{MediaKind, Orientation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

const PHOTO_SEARCH_URL: &str = "https://api.pexels.com/v1/search";
const VIDEO_SEARCH_URL: &str = "https://api.pexels.com/videos/search";

/// Pexels serves both photos and stock video clips; the two live on
/// separate endpoints with different response shapes, so the provider is
/// configured for one kind up front.
pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: String,
    kind: MediaKind,
}

impl PexelsProvider {
    pub fn new(api_key: String, kind: MediaKind) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            kind,
        }
    }

    pub fn from_env(kind: MediaKind) -> Result<Self> {
        let api_key = std::env::var("PEXELS_API_KEY").context("PEXELS_API_KEY not set")?;
        Ok(Self::new(api_key, kind))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &str,
        orientation: Orientation,
        max_results: usize,
    ) -> Result<T, MediaError> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", &max_results.to_string()),
                ("orientation", orientation_param(orientation)),
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

        resp.json()
            .await
            .map_err(|e| MediaError::ProviderUnavailable(e.to_string()))
    }
}

#[derive(Deserialize)]
struct PhotoSearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    id: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    photographer: Option<String>,
    src: PhotoSrc,
}

#[derive(Deserialize)]
struct PhotoSrc {
    original: String,
    #[serde(default)]
    large2x: Option<String>,
}

#[derive(Deserialize)]
struct VideoSearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Deserialize)]
struct Video {
    id: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    user: Option<VideoUser>,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Deserialize)]
struct VideoUser {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct VideoFile {
    link: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    file_type: Option<String>,
}

impl Video {
    /// Picks the widest mp4 rendition; variants without a stated width sort
    /// last.
    fn best_file(&self) -> Option<&VideoFile> {
        self.video_files
            .iter()
            .filter(|f| {
                f.file_type
                    .as_deref()
                    .map(|t| t.contains("mp4"))
                    .unwrap_or(true)
            })
            .max_by_key(|f| f.width.unwrap_or(0))
    }
}

fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "landscape",
        Orientation::Portrait => "portrait",
        Orientation::Square => "square",
    }
}

#[async_trait]
impl MediaProvider for PexelsProvider {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        max_results: usize,
    ) -> Result<Vec<MediaCandidate>, MediaError> {
        match self.kind {
            MediaKind::Photo => {
                let body: PhotoSearchResponse = self
                    .get_json(PHOTO_SEARCH_URL, query, orientation, max_results)
                    .await?;
                if body.photos.is_empty() {
                    return Err(MediaError::NoResults(query.to_string()));
                }
                Ok(body
                    .photos
                    .into_iter()
                    .map(|p| MediaCandidate {
                        provider: "pexels".to_string(),
                        id: p.id.to_string(),
                        url: p.src.large2x.unwrap_or(p.src.original),
                        description: p.alt.unwrap_or_default(),
                        tags: Vec::new(),
                        attribution: p.photographer.unwrap_or_default(),
                        width: p.width,
                        height: p.height,
                        kind: MediaKind::Photo,
                    })
                    .collect())
            }
            MediaKind::Video => {
                let body: VideoSearchResponse = self
                    .get_json(VIDEO_SEARCH_URL, query, orientation, max_results)
                    .await?;
                let candidates: Vec<MediaCandidate> = body
                    .videos
                    .iter()
                    .filter_map(|v| {
                        let file = v.best_file()?;
                        Some(MediaCandidate {
                            provider: "pexels".to_string(),
                            id: v.id.to_string(),
                            url: file.link.clone(),
                            description: String::new(),
                            tags: Vec::new(),
                            attribution: v
                                .user
                                .as_ref()
                                .map(|u| u.name.clone())
                                .unwrap_or_default(),
                            width: v.width,
                            height: v.height,
                            kind: MediaKind::Video,
                        })
                    })
                    .collect();
                if candidates.is_empty() {
                    return Err(MediaError::NoResults(query.to_string()));
                }
                Ok(candidates)
            }
        }
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
    fn test_photo_response_shape_parses() {
        let body = r#"{
            "page": 1,
            "per_page": 2,
            "photos": [
                {
                    "id": 12345,
                    "width": 3000,
                    "height": 4500,
                    "url": "https://www.pexels.com/photo/12345/",
                    "alt": "Sunrise over calm water",
                    "photographer": "A Person",
                    "src": {
                        "original": "https://images.pexels.com/photos/12345/a.jpg",
                        "large2x": "https://images.pexels.com/photos/12345/a.jpg?w=1880"
                    }
                }
            ]
        }"#;
        let parsed: PhotoSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.photos.len(), 1);
        assert_eq!(parsed.photos[0].id, 12345);
        assert_eq!(
            parsed.photos[0].alt.as_deref(),
            Some("Sunrise over calm water")
        );
    }

    #[test]
    fn test_missing_optional_fields_tolerated() {
        let body = r#"{
            "photos": [
                {
                    "id": 1,
                    "width": 100,
                    "height": 100,
                    "src": { "original": "https://images.pexels.com/photos/1/a.jpg" }
                }
            ]
        }"#;
        let parsed: PhotoSearchResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.photos[0].alt.is_none());
        assert!(parsed.photos[0].src.large2x.is_none());
    }

    #[test]
    fn test_video_response_picks_widest_mp4() {
        let body = r#"{
            "page": 1,
            "videos": [
                {
                    "id": 777,
                    "width": 1080,
                    "height": 1920,
                    "user": { "id": 9, "name": "A Filmer" },
                    "video_files": [
                        {
                            "id": 1,
                            "quality": "sd",
                            "file_type": "video/mp4",
                            "width": 540,
                            "height": 960,
                            "link": "https://player.vimeo.com/external/777.sd.mp4"
                        },
                        {
                            "id": 2,
                            "quality": "hd",
                            "file_type": "video/mp4",
                            "width": 1080,
                            "height": 1920,
                            "link": "https://player.vimeo.com/external/777.hd.mp4"
                        },
                        {
                            "id": 3,
                            "quality": "hls",
                            "file_type": "application/x-mpegURL",
                            "width": null,
                            "height": null,
                            "link": "https://player.vimeo.com/external/777.m3u8"
                        }
                    ]
                }
            ]
        }"#;
        let parsed: VideoSearchResponse = serde_json::from_str(body).unwrap();
        let video = &parsed.videos[0];
        assert_eq!(video.id, 777);
        let best = video.best_file().unwrap();
        assert_eq!(best.link, "https://player.vimeo.com/external/777.hd.mp4");
        assert_eq!(video.user.as_ref().unwrap().name, "A Filmer");
    }
}
