use crate::job::{JobConfig, MediaKind, Orientation};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_cache")]
    pub cache_folder: String,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub speech: SpeechSettings,

    #[serde(default)]
    pub media: MediaSettings,

    #[serde(default)]
    pub filter: FilterSettings,

    #[serde(default)]
    pub render: RenderSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Jobs allowed to run their pipelines at the same time. Conservative
    /// by default: composition downstream is resource-heavy.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Width of the per-job worker pool for sentence/search-term fan-out.
    #[serde(default = "default_worker_width")]
    pub worker_width: usize,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechSettings {
    /// Fallback order. The first provider is primary.
    #[serde(default = "default_speech_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_rate")]
    pub rate: f32,

    pub style: Option<String>,

    #[serde(default)]
    pub word_level_captions: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaSettings {
    #[serde(default = "default_media_provider")]
    pub provider: String,

    /// Whether slots are filled with stock photos or stock video clips.
    /// Only the pexels provider serves video.
    #[serde(default = "default_media_kind")]
    pub media_type: MediaKind,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// When a slot's search terms all come up empty, fill the gap with the
    /// nearest acquired asset instead of failing the job.
    #[serde(default = "default_true")]
    pub reuse_nearest_asset: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterSettings {
    #[serde(default = "default_rejection_phrases")]
    pub rejection_phrases: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderSettings {
    #[serde(default = "default_orientation")]
    pub aspect_ratio: Orientation,

    pub background_audio: Option<String>,

    pub target_duration_seconds: Option<f64>,

    #[serde(default = "default_ffmpeg_cmd")]
    pub ffmpeg_cmd: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            worker_width: default_worker_width(),
            provider_timeout_seconds: default_provider_timeout(),
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            providers: default_speech_providers(),
            voice: default_voice(),
            rate: default_rate(),
            style: None,
            word_level_captions: false,
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            provider: default_media_provider(),
            media_type: default_media_kind(),
            max_results: default_max_results(),
            reuse_nearest_asset: true,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            rejection_phrases: default_rejection_phrases(),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: default_orientation(),
            background_audio: None,
            target_duration_seconds: None,
            ffmpeg_cmd: default_ffmpeg_cmd(),
        }
    }
}

fn default_build() -> String {
    "build".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_cache() -> String {
    "cache".to_string()
}
fn default_max_concurrent_jobs() -> usize {
    1
}
fn default_worker_width() -> usize {
    4
}
fn default_provider_timeout() -> u64 {
    30
}
fn default_speech_providers() -> Vec<String> {
    vec!["elevenlabs".to_string(), "airforce".to_string()]
}
fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}
fn default_rate() -> f32 {
    1.0
}
fn default_media_provider() -> String {
    "pexels".to_string()
}
fn default_media_kind() -> MediaKind {
    MediaKind::Photo
}
fn default_max_results() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_orientation() -> Orientation {
    Orientation::Portrait
}
fn default_ffmpeg_cmd() -> String {
    "ffmpeg".to_string()
}
fn default_rejection_phrases() -> Vec<String> {
    [
        "argument", "fight", "prison", "jail", "depression", "darkness", "occult", "violence",
        "conflict", "suffering",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{:?} not found. Please create one.", path);
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("failed to parse {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.build_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.cache_folder)?;
        Ok(())
    }

    /// Per-job configuration derived from the process-wide defaults.
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            voice: self.speech.voice.clone(),
            rate: self.speech.rate,
            style: self.speech.style.clone(),
            orientation: self.render.aspect_ratio,
            word_level_captions: self.speech.word_level_captions,
            max_results: self.media.max_results,
            reuse_nearest_asset: self.media.reuse_nearest_asset,
            background_audio: self
                .render
                .background_audio
                .as_ref()
                .map(std::path::PathBuf::from),
            target_duration_secs: self.render.target_duration_seconds,
        }
    }
}
