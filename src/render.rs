use crate::error::PipelineError;
use crate::job::{CaptionCue, MediaKind, Orientation};
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// One visual slot in the composed timeline: an asset shown for exactly the
/// sentence's narration span, with the cues covering that span.
#[derive(Debug, Clone)]
pub struct ComposeSlot {
    pub asset_path: PathBuf,
    pub kind: MediaKind,
    pub duration_secs: f64,
    pub cues: Vec<CaptionCue>,
}

/// Everything the external renderer needs for one output clip.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub slots: Vec<ComposeSlot>,
    pub audio_path: PathBuf,
    pub subtitles_path: Option<PathBuf>,
    pub orientation: Orientation,
    pub background_audio: Option<PathBuf>,
    pub target_duration_secs: Option<f64>,
}

/// Renderer boundary. Composition internals (codecs, transitions, effect
/// math) live on the other side of this trait.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, req: &ComposeRequest, out_dir: &Path) -> Result<PathBuf, PipelineError>;
}

/// Renderer that shells out to ffmpeg: each slot becomes one input trimmed
/// to the slot duration (stills looped as a single frame, clips looped end
/// to end), concatenated, scaled to the target frame, with subtitles burned
/// in and the narration track muxed on top.
pub struct FfmpegRenderer {
    ffmpeg_cmd: String,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg_cmd: impl Into<String>) -> Self {
        Self {
            ffmpeg_cmd: ffmpeg_cmd.into(),
        }
    }

    fn frame_size(orientation: Orientation) -> (u32, u32) {
        match orientation {
            Orientation::Landscape => (1920, 1080),
            Orientation::Portrait => (1080, 1920),
            Orientation::Square => (1080, 1080),
        }
    }

    fn build_args(&self, req: &ComposeRequest, output: &Path) -> Vec<String> {
        let (w, h) = Self::frame_size(req.orientation);
        let mut args: Vec<String> = vec!["-y".into()];

        for slot in &req.slots {
            match slot.kind {
                MediaKind::Photo => {
                    args.push("-loop".into());
                    args.push("1".into());
                }
                // A clip shorter than its narration span repeats.
                MediaKind::Video => {
                    args.push("-stream_loop".into());
                    args.push("-1".into());
                }
            }
            args.push("-t".into());
            args.push(format!("{:.3}", slot.duration_secs.max(0.04)));
            args.push("-i".into());
            args.push(slot.asset_path.to_string_lossy().into_owned());
        }
        let narration_input = req.slots.len();
        args.push("-i".into());
        args.push(req.audio_path.to_string_lossy().into_owned());
        if let Some(bg) = &req.background_audio {
            args.push("-stream_loop".into());
            args.push("-1".into());
            args.push("-i".into());
            args.push(bg.to_string_lossy().into_owned());
        }

        let mut filter = String::new();
        for i in 0..req.slots.len() {
            filter.push_str(&format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1[v{i}];"
            ));
        }
        for i in 0..req.slots.len() {
            filter.push_str(&format!("[v{i}]"));
        }
        filter.push_str(&format!("concat=n={}:v=1:a=0[vall]", req.slots.len()));
        if let Some(srt) = &req.subtitles_path {
            filter.push_str(&format!(
                ";[vall]subtitles='{}'[vout]",
                srt.to_string_lossy()
            ));
        } else {
            filter.push_str(";[vall]null[vout]");
        }
        if req.background_audio.is_some() {
            // Narration stays dominant; the looped background track is ducked.
            filter.push_str(&format!(
                ";[{bg}:a]volume=0.2[bg];[{n}:a][bg]amix=inputs=2:duration=first[aout]",
                n = narration_input,
                bg = narration_input + 1
            ));
        }

        args.push("-filter_complex".into());
        args.push(filter);
        args.push("-map".into());
        args.push("[vout]".into());
        args.push("-map".into());
        if req.background_audio.is_some() {
            args.push("[aout]".into());
        } else {
            args.push(format!("{narration_input}:a"));
        }
        args.push("-c:v".into());
        args.push("libx264".into());
        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
        if let Some(limit) = req.target_duration_secs {
            args.push("-t".into());
            args.push(format!("{:.3}", limit));
        }
        args.push("-shortest".into());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, req: &ComposeRequest, out_dir: &Path) -> Result<PathBuf, PipelineError> {
        if req.slots.is_empty() {
            return Err(PipelineError::RenderFailed(
                "compose request has no slots".to_string(),
            ));
        }

        let output = out_dir.join("final.mp4");
        let args = self.build_args(req, &output);
        debug!("ffmpeg args: {:?}", args);

        let result = tokio::process::Command::new(&self.ffmpeg_cmd)
            .args(&args)
            .output()
            .await
            .map_err(|e| PipelineError::RenderFailed(format!("failed to spawn ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(PipelineError::RenderFailed(format!(
                "ffmpeg exited with {}: {}",
                result.status, tail
            )));
        }

        info!("rendered {:?}", output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(slot_count: usize, with_srt: bool) -> ComposeRequest {
        ComposeRequest {
            slots: (0..slot_count)
                .map(|i| ComposeSlot {
                    asset_path: PathBuf::from(format!("asset_{i}.jpg")),
                    kind: MediaKind::Photo,
                    duration_secs: 1.5,
                    cues: Vec::new(),
                })
                .collect(),
            audio_path: PathBuf::from("narration.wav"),
            subtitles_path: with_srt.then(|| PathBuf::from("captions.srt")),
            orientation: Orientation::Portrait,
            background_audio: None,
            target_duration_secs: None,
        }
    }

    #[test]
    fn test_args_include_all_slots_and_audio_map() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let args = renderer.build_args(&request(3, true), Path::new("final.mp4"));

        assert_eq!(args.iter().filter(|a| *a == "-loop").count(), 3);
        // Audio is the input after the three stills.
        assert!(args.contains(&"3:a".to_string()));
        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(filter.contains("concat=n=3:v=1:a=0"));
        assert!(filter.contains("subtitles='captions.srt'"));
    }

    #[test]
    fn test_background_audio_mixed_under_narration() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let mut req = request(2, false);
        req.background_audio = Some(PathBuf::from("lofi.mp3"));
        let args = renderer.build_args(&req, Path::new("final.mp4"));

        // Background track is the input after the narration track and is
        // mixed, not mapped directly.
        assert!(args.contains(&"lofi.mp3".to_string()));
        assert!(args.contains(&"[aout]".to_string()));
        assert!(!args.contains(&"2:a".to_string()));
        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(filter.contains("amix=inputs=2"));
        assert!(filter.contains("[3:a]volume=0.2[bg]"));
    }

    #[test]
    fn test_video_slots_stream_loop_instead_of_still_loop() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let mut req = request(2, false);
        req.slots[1].asset_path = PathBuf::from("clip_1.mp4");
        req.slots[1].kind = MediaKind::Video;
        let args = renderer.build_args(&req, Path::new("final.mp4"));

        assert_eq!(args.iter().filter(|a| *a == "-loop").count(), 1);
        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_pos + 1], "-1");
        // The clip is still trimmed to its narration span.
        assert_eq!(args[loop_pos + 2], "-t");
        assert_eq!(args[loop_pos + 4], "-i");
        assert_eq!(args[loop_pos + 5], "clip_1.mp4");
    }

    #[test]
    fn test_no_subtitles_keeps_video_chain() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let args = renderer.build_args(&request(1, false), Path::new("final.mp4"));
        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(!filter.contains("subtitles"));
        assert!(filter.contains("[vout]"));
    }
}
