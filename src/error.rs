use thiserror::Error;

/// Failure kinds a speech provider can report. `ProviderUnavailable` is
/// transient and moves the fallback chain forward; the other two mean the
/// provider will never succeed for this request, so the chain also moves on
/// but never retries the same provider.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("voice '{0}' not found on this provider")]
    VoiceNotFound(String),

    #[error("provider rejected the text for synthesis: {0}")]
    SynthesisRejected(String),
}

/// Failure kinds a media provider can report.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no results for query '{0}'")]
    NoResults(String),
}

/// Job-fatal errors that reach the orchestrator. Recoverable errors
/// (fallback, next search term, content rejection) are handled inside the
/// adapter layer and never show up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("synthesis failed for sentence {index}")]
    SynthesisFailed {
        index: usize,
        #[source]
        source: SpeechError,
    },

    #[error("asset acquisition failed: no usable media for any search term")]
    AssetAcquisitionFailed,

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("audio processing failed: {0}")]
    Audio(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the job should report as cleanly cancelled rather than failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
