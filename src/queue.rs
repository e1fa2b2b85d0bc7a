use crate::job::{GenerationJob, JobConfig, JobId, JobState};
use crate::pipeline::Orchestrator;
use crate::script::Script;
use anyhow::Result;
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Sentences longer than this are re-chunked at whitespace before
/// synthesis; provider payloads stay small and cues stay readable.
pub const MAX_SENTENCE_LEN: usize = 100;

/// Point-in-time view of one job, as returned by `poll`.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub segments_done: usize,
    pub assets_done: usize,
    pub cue_count: usize,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

/// Job admission and lifecycle. Accepted jobs run on spawned tasks behind a
/// semaphore sized to `max_concurrent_jobs`; submission never blocks on a
/// running pipeline. Jobs stay in the table after reaching a terminal state
/// so their outcome remains pollable.
pub struct JobQueue {
    jobs: Mutex<HashMap<JobId, Arc<Mutex<GenerationJob>>>>,
    slots: Arc<Semaphore>,
    orchestrator: Arc<Orchestrator>,
    counter: AtomicU64,
}

impl JobQueue {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent_jobs: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            orchestrator,
            counter: AtomicU64::new(0),
        }
    }

    /// Parses the script, registers the job as `Pending` and spawns its
    /// pipeline task. Returns the new job's id; script parse failures are
    /// rejected here, before anything is enqueued.
    pub fn submit(
        &self,
        script_text: &str,
        search_terms: Vec<String>,
        config: JobConfig,
    ) -> Result<JobId> {
        let script = Script::parse(script_text, MAX_SENTENCE_LEN)?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("job-{:04}", n);
        info!("submitted {} ({} sentences)", id, script.len());

        let job = Arc::new(Mutex::new(GenerationJob::new(
            id.clone(),
            script,
            search_terms,
            config,
        )));
        self.jobs
            .lock()
            .expect("job table poisoned")
            .insert(id.clone(), job.clone());

        let slots = self.slots.clone();
        let orchestrator = self.orchestrator.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("queue semaphore closed; dropping {}", task_id);
                    return;
                }
            };
            let result = orchestrator.run(job).await;
            info!("{} finished: {:?}", task_id, result.state);
        });

        Ok(id)
    }

    /// Requests cancellation. Returns `true` if the job exists and was still
    /// running; cancelling a terminal job is a no-op.
    pub fn cancel(&self, id: &str) -> bool {
        let jobs = self.jobs.lock().expect("job table poisoned");
        match jobs.get(id) {
            Some(job) => {
                let j = job.lock().expect("job mutex poisoned");
                if j.state.is_terminal() {
                    false
                } else {
                    j.cancel.cancel();
                    true
                }
            }
            None => false,
        }
    }

    pub fn poll(&self, id: &str) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().expect("job table poisoned");
        jobs.get(id).map(|job| {
            let j = job.lock().expect("job mutex poisoned");
            JobSnapshot {
                id: j.id.clone(),
                state: j.state,
                segments_done: j.segments.len(),
                assets_done: j.assets.len(),
                cue_count: j.cues.len(),
                output: j.output.clone(),
                error: j.error.clone(),
            }
        })
    }
}
