use crate::script::Script;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type JobId = String;

/// Pipeline state machine. `Pending` is initial; `Completed`, `Cancelled`
/// and `Failed` are terminal, with the latter two reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    ScriptReady,
    Synthesizing,
    AssetsAcquiring,
    Synchronizing,
    Composed,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

/// Cooperative per-job cancellation flag. Write-once to "cancelled", never
/// reset; checked at stage boundaries and inside per-unit fan-out loops.
/// In-flight provider calls are allowed to finish and their results are
/// discarded rather than aborted mid-transfer.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Result<(), crate::error::PipelineError> {
        if self.is_cancelled() {
            Err(crate::error::PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a media asset is. Photos are looped as stills during composition;
/// videos play (and loop if shorter than their narration span).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    /// Classifies media dimensions: noticeably wider than tall is landscape,
    /// noticeably taller is portrait, anything close to 1:1 is square.
    pub fn classify(width: u32, height: u32) -> Self {
        if height == 0 {
            return Orientation::Landscape;
        }
        let ratio = width as f64 / height as f64;
        if ratio > 1.2 {
            Orientation::Landscape
        } else if ratio < 0.8 {
            Orientation::Portrait
        } else {
            Orientation::Square
        }
    }
}

/// One sentence's synthesized audio. `duration_secs` is always measured from
/// the actual WAV bytes; `provider` records which chain member produced it.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub sentence_index: usize,
    pub text: String,
    pub provider: String,
    pub voice_id: String,
    pub duration_secs: f64,
    pub audio_path: PathBuf,
}

/// A fetched media asset. Rejected candidates never become assets; they are
/// retained only in the content filter's rejection log.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub provider: String,
    pub id: String,
    pub url: String,
    pub local_path: PathBuf,
    pub orientation: Orientation,
    pub kind: MediaKind,
}

/// A caption's time-bounded text span, relative to narration start.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Per-job configuration, fixed at submission time.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub voice: String,
    pub rate: f32,
    pub style: Option<String>,
    pub orientation: Orientation,
    pub word_level_captions: bool,
    pub max_results: usize,
    pub reuse_nearest_asset: bool,
    pub background_audio: Option<PathBuf>,
    pub target_duration_secs: Option<f64>,
}

/// A job in the queue. Owned exclusively by the orchestrator while running;
/// the queue only takes short locks for poll/cancel snapshots.
pub struct GenerationJob {
    pub id: JobId,
    pub script: Script,
    pub search_terms: Vec<String>,
    pub config: JobConfig,
    pub state: JobState,
    pub cancel: CancellationToken,
    pub segments: Vec<SpeechSegment>,
    pub assets: Vec<MediaAsset>,
    pub cues: Vec<CaptionCue>,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn new(id: JobId, script: Script, search_terms: Vec<String>, config: JobConfig) -> Self {
        Self {
            id,
            script,
            search_terms,
            config,
            state: JobState::Pending,
            cancel: CancellationToken::new(),
            segments: Vec::new(),
            assets: Vec::new(),
            cues: Vec::new(),
            output: None,
            error: None,
        }
    }
}

/// Outcome of one pipeline run, as handed back to the submitter.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub state: JobState,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}
