use anyhow::{Context, Result};
use log::info;
use reelsmith::config::Config;
use reelsmith::media::{ContentFilter, MediaAcquirer};
use reelsmith::pipeline::Orchestrator;
use reelsmith::queue::JobQueue;
use reelsmith::render::FfmpegRenderer;
use reelsmith::speech::SpeechSynthesizer;
use reelsmith::cache::CacheStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let script_path = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("Usage: reelsmith <script.txt> [search terms...]");
            std::process::exit(2);
        }
    };
    let search_terms: Vec<String> = args.collect();

    // 1. Load Config
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    let script_text = std::fs::read_to_string(&script_path)
        .with_context(|| format!("failed to read script {}", script_path))?;

    // 2. Initialize providers and the shared cache
    let cache = Arc::new(CacheStore::new(&config.cache_folder)?);
    let timeout = Duration::from_secs(config.pipeline.provider_timeout_seconds);

    let synthesizer = Arc::new(SpeechSynthesizer::new(
        reelsmith::speech::build_chain(&config.speech)?,
        cache.clone(),
        timeout,
    ));
    let acquirer = Arc::new(MediaAcquirer::new(
        reelsmith::media::create_provider(&config.media)?,
        Arc::new(ContentFilter::new(config.filter.rejection_phrases.clone())),
        cache,
        timeout,
    ));
    let renderer = Arc::new(FfmpegRenderer::new(config.render.ffmpeg_cmd.clone()));

    // 3. Queue and submit
    let orchestrator = Arc::new(Orchestrator::new(
        synthesizer,
        acquirer,
        renderer,
        config.pipeline.worker_width,
        &config.build_folder,
        &config.output_folder,
    ));
    let queue = Arc::new(JobQueue::new(
        orchestrator,
        config.pipeline.max_concurrent_jobs,
    ));

    let id = queue.submit(&script_text, search_terms, config.job_config())?;
    info!("submitted {}", id);

    // 4. Poll to a terminal state; Ctrl+C cancels the job cooperatively.
    let mut last_state = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("cancelling {}...", id);
                queue.cancel(&id);
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }

        let snap = queue
            .poll(&id)
            .context("job vanished from the queue")?;
        if last_state != Some(snap.state) {
            info!(
                "{}: {:?} ({} segments, {} assets)",
                id, snap.state, snap.segments_done, snap.assets_done
            );
            last_state = Some(snap.state);
        }
        if snap.state.is_terminal() {
            match (snap.output, snap.error) {
                (Some(path), _) => println!("{}", path.display()),
                (None, Some(err)) => {
                    eprintln!("{} failed: {}", id, err);
                    std::process::exit(1);
                }
                (None, None) => {
                    eprintln!("{} cancelled", id);
                    std::process::exit(1);
                }
            }
            break;
        }
    }

    Ok(())
}
