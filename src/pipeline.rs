use crate::error::PipelineError;
use crate::job::{
    CancellationToken, CaptionCue, GenerationJob, JobConfig, JobResult, JobState, MediaAsset,
    SpeechSegment,
};
use crate::media::MediaAcquirer;
use crate::render::{ComposeRequest, ComposeSlot, Renderer};
use crate::script::Script;
use crate::speech::SpeechSynthesizer;
use crate::sync;
use crate::utils::audio::merge_wav_files;
use futures_util::future::join_all;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Drives one job through the pipeline state machine:
/// `Pending → ScriptReady → Synthesizing → AssetsAcquiring → Synchronizing
/// → Composed → Completed`, with `Cancelled` and `Failed` reachable from
/// every non-terminal state. The cancellation token is checked at every
/// stage boundary and before each per-sentence / per-term unit of work.
pub struct Orchestrator {
    synthesizer: Arc<SpeechSynthesizer>,
    acquirer: Arc<MediaAcquirer>,
    renderer: Arc<dyn Renderer>,
    workers: Arc<Semaphore>,
    build_root: PathBuf,
    output_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        synthesizer: Arc<SpeechSynthesizer>,
        acquirer: Arc<MediaAcquirer>,
        renderer: Arc<dyn Renderer>,
        worker_width: usize,
        build_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            acquirer,
            renderer,
            workers: Arc::new(Semaphore::new(worker_width.max(1))),
            build_root: build_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Runs the job to a terminal state. Cancellation always wins over any
    /// stage outcome and reports as `Cancelled`, never as `Failed`. On
    /// cancel or failure the job's temporary folder is removed; shared
    /// cache entries are content-addressed and kept.
    pub async fn run(&self, job: Arc<Mutex<GenerationJob>>) -> JobResult {
        let (id, script, terms, config, cancel) = {
            let mut j = job.lock().expect("job mutex poisoned");
            j.state = JobState::ScriptReady;
            (
                j.id.clone(),
                j.script.clone(),
                j.search_terms.clone(),
                j.config.clone(),
                j.cancel.clone(),
            )
        };

        let job_dir = self.build_root.join(&id);
        let result = self
            .execute(&id, &script, &terms, &config, &cancel, &job_dir, &job)
            .await;

        let mut j = job.lock().expect("job mutex poisoned");
        match result {
            Ok(output) => {
                j.state = JobState::Completed;
                j.output = Some(output);
            }
            Err(e) if e.is_cancellation() => {
                info!("job {} cancelled", id);
                j.state = JobState::Cancelled;
                j.segments.clear();
                j.assets.clear();
                j.cues.clear();
                cleanup_job_dir(&job_dir);
            }
            Err(e) => {
                warn!("job {} failed in state {:?}: {}", id, j.state, e);
                j.error = Some(format!("{:?}: {}", j.state, e));
                j.state = JobState::Failed;
                cleanup_job_dir(&job_dir);
            }
        }
        JobResult {
            state: j.state,
            output: j.output.clone(),
            error: j.error.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        id: &str,
        script: &Script,
        terms: &[String],
        config: &JobConfig,
        cancel: &CancellationToken,
        job_dir: &Path,
        job: &Arc<Mutex<GenerationJob>>,
    ) -> Result<PathBuf, PipelineError> {
        cancel.checkpoint()?;
        std::fs::create_dir_all(job_dir)?;

        // Synthesis: per-sentence fan-out, reassembled in sentence order.
        set_state(job, JobState::Synthesizing);
        cancel.checkpoint()?;
        let segments = self.synthesize_all(script, config, cancel, job).await?;
        {
            let mut j = job.lock().expect("job mutex poisoned");
            j.segments = segments.clone();
        }

        // Acquisition: one slot per sentence, per-term fan-out.
        set_state(job, JobState::AssetsAcquiring);
        cancel.checkpoint()?;
        let slots = self.acquire_all(script, terms, config, cancel, job).await?;
        let assets = fill_gaps(slots, config.reuse_nearest_asset)?;
        {
            let mut j = job.lock().expect("job mutex poisoned");
            j.assets = assets.clone();
        }

        // Synchronization: cue timing from measured durations only.
        set_state(job, JobState::Synchronizing);
        cancel.checkpoint()?;
        let cues = if config.word_level_captions {
            sync::synchronize_words(&segments)
        } else {
            sync::synchronize(&segments)
        };
        let subtitles_path = job_dir.join("captions.srt");
        std::fs::write(&subtitles_path, sync::to_srt(&cues))?;
        {
            let mut j = job.lock().expect("job mutex poisoned");
            j.cues = cues.clone();
        }

        let narration_path = job_dir.join("narration.wav");
        let audio_paths: Vec<PathBuf> = segments.iter().map(|s| s.audio_path.clone()).collect();
        merge_wav_files(&audio_paths, &narration_path)
            .map_err(|e| PipelineError::Audio(e.to_string()))?;

        // Composition handoff to the external renderer.
        set_state(job, JobState::Composed);
        cancel.checkpoint()?;
        let request = compose_request(&segments, &assets, &cues, config, narration_path, subtitles_path);
        let out_dir = self.output_root.join(id);
        std::fs::create_dir_all(&out_dir)?;
        let output = self.renderer.render(&request, &out_dir).await?;

        cancel.checkpoint()?;
        Ok(output)
    }

    async fn synthesize_all(
        &self,
        script: &Script,
        config: &JobConfig,
        cancel: &CancellationToken,
        job: &Arc<Mutex<GenerationJob>>,
    ) -> Result<Vec<SpeechSegment>, PipelineError> {
        let mut tasks = Vec::with_capacity(script.len());
        for sentence in script.sentences() {
            let workers = self.workers.clone();
            let synthesizer = self.synthesizer.clone();
            let cancel = cancel.clone();
            let job = job.clone();
            let config = config.clone();
            let sentence = sentence.clone();
            tasks.push(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Internal(format!("worker pool closed: {e}")))?;
                cancel.checkpoint()?;
                let segment = synthesizer
                    .synthesize(&sentence, &config.voice, config.rate, config.style.as_deref())
                    .await?;
                // Completion-order progress for poll(); the ordered list
                // replaces this once the stage completes.
                job.lock()
                    .expect("job mutex poisoned")
                    .segments
                    .push(segment.clone());
                Ok::<SpeechSegment, PipelineError>(segment)
            });
        }

        let results = join_all(tasks).await;
        cancel.checkpoint()?;

        let mut ordered: Vec<Option<SpeechSegment>> = vec![None; script.len()];
        for result in results {
            let segment = result?;
            let idx = segment.sentence_index;
            ordered[idx] = Some(segment);
        }
        ordered
            .into_iter()
            .map(|s| s.ok_or_else(|| PipelineError::Internal("missing segment slot".into())))
            .collect()
    }

    async fn acquire_all(
        &self,
        script: &Script,
        terms: &[String],
        config: &JobConfig,
        cancel: &CancellationToken,
        job: &Arc<Mutex<GenerationJob>>,
    ) -> Result<Vec<Option<MediaAsset>>, PipelineError> {
        let mut tasks = Vec::with_capacity(script.len());
        for sentence in script.sentences() {
            let workers = self.workers.clone();
            let acquirer = self.acquirer.clone();
            let cancel = cancel.clone();
            let job = job.clone();
            let slot_terms = terms_for_slot(sentence.index, &sentence.text, terms);
            let orientation = config.orientation;
            let max_results = config.max_results;
            tasks.push(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Internal(format!("worker pool closed: {e}")))?;
                cancel.checkpoint()?;
                let asset = acquirer
                    .acquire_slot(&slot_terms, orientation, max_results, &cancel)
                    .await?;
                if let Some(asset) = &asset {
                    job.lock()
                        .expect("job mutex poisoned")
                        .assets
                        .push(asset.clone());
                }
                Ok::<Option<MediaAsset>, PipelineError>(asset)
            });
        }

        let results = join_all(tasks).await;
        cancel.checkpoint()?;
        results.into_iter().collect()
    }
}

fn set_state(job: &Arc<Mutex<GenerationJob>>, state: JobState) {
    job.lock().expect("job mutex poisoned").state = state;
}

fn cleanup_job_dir(job_dir: &Path) {
    if job_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(job_dir) {
            warn!("failed to clean up {:?}: {}", job_dir, e);
        }
    }
}

/// The term list one slot walks: the slot's own term first (round-robin
/// over the provided list), then the remaining terms as fallbacks. Jobs
/// submitted without search terms fall back to the sentence text itself.
fn terms_for_slot(index: usize, sentence_text: &str, terms: &[String]) -> Vec<String> {
    if terms.is_empty() {
        return vec![sentence_text.to_string()];
    }
    let start = index % terms.len();
    let mut rotated = Vec::with_capacity(terms.len());
    rotated.extend_from_slice(&terms[start..]);
    rotated.extend_from_slice(&terms[..start]);
    rotated
}

/// Degradation policy: a job with zero usable slots fails; with at least
/// one, gaps are filled by the nearest acquired asset when the
/// configuration allows reuse, otherwise any gap fails the job.
fn fill_gaps(
    slots: Vec<Option<MediaAsset>>,
    reuse_nearest: bool,
) -> Result<Vec<MediaAsset>, PipelineError> {
    if slots.iter().all(Option::is_none) {
        return Err(PipelineError::AssetAcquisitionFailed);
    }
    if !reuse_nearest && slots.iter().any(Option::is_none) {
        return Err(PipelineError::AssetAcquisitionFailed);
    }

    let filled: Vec<MediaAsset> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Some(asset) => asset.clone(),
            None => {
                let nearest = slots
                    .iter()
                    .enumerate()
                    .filter_map(|(j, s)| s.as_ref().map(|a| (j, a)))
                    .min_by_key(|(j, _)| i.abs_diff(*j))
                    .map(|(_, a)| a.clone());
                // all-None was ruled out above
                nearest.expect("at least one slot is filled")
            }
        })
        .collect();
    Ok(filled)
}

fn compose_request(
    segments: &[SpeechSegment],
    assets: &[MediaAsset],
    cues: &[CaptionCue],
    config: &JobConfig,
    narration_path: PathBuf,
    subtitles_path: PathBuf,
) -> ComposeRequest {
    let mut slots = Vec::with_capacity(segments.len());
    let mut clock = 0.0f64;
    for (segment, asset) in segments.iter().zip(assets) {
        let start = clock;
        let end = clock + segment.duration_secs;
        slots.push(ComposeSlot {
            asset_path: asset.local_path.clone(),
            kind: asset.kind,
            duration_secs: segment.duration_secs,
            cues: cues_in_span(cues, start, end),
        });
        clock = end;
    }

    ComposeRequest {
        slots,
        audio_path: narration_path,
        subtitles_path: Some(subtitles_path),
        orientation: config.orientation,
        background_audio: config.background_audio.clone(),
        target_duration_secs: config.target_duration_secs,
    }
}

/// Cues whose start lies inside `[start, end)`, plus degenerate cues
/// sitting exactly on a zero-width span.
fn cues_in_span(cues: &[CaptionCue], start: f64, end: f64) -> Vec<CaptionCue> {
    const EPS: f64 = 1e-9;
    cues.iter()
        .filter(|c| {
            (c.start_secs + EPS >= start && c.start_secs < end - EPS)
                || ((end - start).abs() < EPS && (c.start_secs - start).abs() < EPS)
        })
        .cloned()
        .collect()
}
