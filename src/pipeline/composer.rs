// Shortsmith Composer - single-pass ffmpeg assembly
//
// One ffmpeg invocation builds the whole frame: a black canvas, the
// trimmed footage cover-scaled into its band, the text overlay PNG on
// top, and optionally a quiet music bed. The overlay PNG is a scratch
// file next to the output and is removed whether the render succeeds
// or not.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Settings;
use crate::pipeline::overlay::OverlayBuilder;
use crate::pipeline::{media, CandidateAsset, Composer, GeneratedFact, MusicTrack, RenderedArtifact};

const MUSIC_VOLUME: f32 = 0.15;

pub struct FfmpegComposer {
    settings: Settings,
    overlay: OverlayBuilder,
}

impl FfmpegComposer {
    pub fn new(settings: &Settings, rng: StdRng) -> Self {
        Self {
            settings: settings.clone(),
            overlay: OverlayBuilder::new(settings, rng),
        }
    }

    /// Keep the requested window inside the source footage.
    fn clamp_trim(trim_point: f64, source_duration: f64, target_duration: f64) -> f64 {
        let latest_start = (source_duration - target_duration).max(0.0);
        trim_point.clamp(0.0, latest_start)
    }
}

#[async_trait]
impl Composer for FfmpegComposer {
    async fn render(
        &self,
        asset: &CandidateAsset,
        trim_point: f64,
        duration_secs: u32,
        fact: &GeneratedFact,
        music: Option<&MusicTrack>,
        output: &Path,
    ) -> Result<RenderedArtifact> {
        let duration = duration_secs as f64;
        let trim = Self::clamp_trim(trim_point, asset.duration, duration);
        debug!(
            "[COMPOSE] clip {} trim {:.2}s -> {:.2}s window, {:.0}s target",
            asset.id, trim_point, trim, duration
        );

        let overlay_png = output.with_extension("overlay.png");
        self.overlay.render_png(fact, &overlay_png)?;

        let result = self
            .run_ffmpeg(asset, trim, duration, music, &overlay_png, output)
            .await;
        let _ = std::fs::remove_file(&overlay_png);
        if result.is_err() {
            // ffmpeg can die mid-encode and leave a partial file behind.
            let _ = std::fs::remove_file(output);
        }
        result?;

        let rendered_duration = media::video_duration(output).await?;
        let (width, height) = media::video_dimensions(output).await?;
        info!(
            "[COMPOSE] rendered {:?} ({:.2}s, {}x{})",
            output.file_name(),
            rendered_duration,
            width,
            height
        );
        Ok(RenderedArtifact {
            path: output.to_path_buf(),
            duration: rendered_duration,
            width,
            height,
        })
    }
}

impl FfmpegComposer {
    async fn run_ffmpeg(
        &self,
        asset: &CandidateAsset,
        trim: f64,
        duration: f64,
        music: Option<&MusicTrack>,
        overlay_png: &Path,
        output: &Path,
    ) -> Result<()> {
        let s = &self.settings;
        let canvas = format!(
            "color=black:size={}x{}:rate={}",
            s.video_width, s.video_height, s.fps
        );
        let band_y = s.text_band_height();
        let mut filter = format!(
            "[1:v]scale={w}:{bh}:force_original_aspect_ratio=increase,\
             crop={w}:{bh}[clip];\
             [0:v][clip]overlay=0:{y}:shortest=1[base];\
             [base][2:v]overlay=0:0[vout]",
            w = s.video_width,
            bh = s.video_band_height,
            y = band_y,
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.kill_on_drop(true)
            .args(["-y", "-f", "lavfi", "-i", &canvas])
            .args(["-ss", &format!("{trim:.3}")])
            .arg("-i")
            .arg(&asset.path)
            .arg("-i")
            .arg(overlay_png);

        if let Some(track) = music {
            cmd.arg("-i").arg(&track.path);
            filter.push_str(&format!(
                ";[3:a]atrim=0:{duration:.3},volume={MUSIC_VOLUME}[aout]"
            ));
        }

        cmd.args(["-filter_complex", &filter])
            .args(["-map", "[vout]"]);
        if music.is_some() {
            cmd.args(["-map", "[aout]"]).args(["-c:a", "aac"]);
        } else {
            cmd.arg("-an");
        }
        cmd.args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-r", &s.fps.to_string()])
            .args(["-t", &format!("{duration:.3}")])
            .arg(output);

        let result = cmd.output().await.context("ffmpeg failed to start")?;
        if !result.status.success() {
            bail!(
                "ffmpeg composition failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        if !output.is_file() {
            return Err(anyhow!("ffmpeg reported success but wrote no output"));
        }
        Ok(())
    }
}
