// Shortsmith Media Probes - ffmpeg/ffprobe plumbing
//
// Small wrappers shared by the vision gates and the composer. Probes run
// with a timeout and kill_on_drop so a wedged ffprobe never hangs the
// pipeline; a probe timeout surfaces as an ordinary error and consumes a
// retry slot like any other collaborator failure.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const FRAME_TIMEOUT: Duration = Duration::from_secs(20);

/// True when an ffmpeg binary is on PATH and answers `-version`.
pub async fn check_ffmpeg() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Container duration in seconds.
pub async fn video_duration(path: &Path) -> Result<f64> {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output(),
    )
    .await
    .context("ffprobe duration check timed out")??;

    if !output.status.success() {
        bail!(
            "ffprobe failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .context("could not parse duration from ffprobe output")
}

/// Width and height of the first video stream.
pub async fn video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
            ])
            .arg(path)
            .output(),
    )
    .await
    .context("ffprobe dimension check timed out")??;

    if !output.status.success() {
        bail!(
            "ffprobe failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.trim().lines().next().unwrap_or_default();
    let (w, h) = line
        .split_once('x')
        .with_context(|| format!("unexpected ffprobe stream output: {line}"))?;
    Ok((w.trim().parse()?, h.trim().parse()?))
}

/// Extract a single JPEG frame at `time_secs`.
pub async fn extract_frame(video: &Path, time_secs: f64, output: &Path) -> Result<()> {
    let result = tokio::time::timeout(
        FRAME_TIMEOUT,
        Command::new("ffmpeg")
            .kill_on_drop(true)
            .args(["-y", "-ss", &format!("{time_secs:.3}"), "-i"])
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "3"])
            .arg(output)
            .output(),
    )
    .await
    .context("ffmpeg frame extraction timed out")??;

    if !result.status.success() {
        bail!(
            "frame extraction failed at {:.2}s: {}",
            time_secs,
            String::from_utf8_lossy(&result.stderr).trim()
        );
    }
    Ok(())
}

/// Cheap local screen before a frame is spent on a vision call: a frame
/// that is nearly black tells the model nothing.
pub fn frame_is_informative(path: &Path) -> bool {
    let img = match image::open(path) {
        Ok(i) => i.to_luma8(),
        Err(_) => return false,
    };

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return false;
    }

    let total: u64 = img.pixels().map(|p| p[0] as u64).sum();
    let mean = total / (w as u64 * h as u64);
    debug!("[MEDIA] frame {:?} mean luma {}", path.file_name(), mean);
    mean >= 8
}
