// Shortsmith Vision Gates - frame sampling and model review
//
// Two gates share the same sampling machinery but fail in opposite
// directions. The pre-render verifier is the quality gate for raw footage
// and reports its errors honestly; the controller treats those as
// rejections. The post-render auditor also reports errors honestly, and
// the controller chooses to accept on audit failure instead. Neither gate
// makes that policy call itself.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::pipeline::{media, AssetVerifier, CandidateAsset, FinalAuditor, GeneratedFact, Verification};

const VERIFY_FRAMES: usize = 6;
const AUDIT_FRAMES: usize = 3;
/// Back off from the best frame so playback starts just before it.
const TRIM_LEAD_IN: f64 = 1.0;

/// Evenly spaced sample timestamps, skipping the very start and end.
/// Frame i of n lands at duration / (n + 1) * i, i counted from 1.
pub fn sample_timestamps(duration: f64, frames: usize) -> Vec<f64> {
    let step = duration / (frames as f64 + 1.0);
    (1..=frames).map(|i| step * i as f64).collect()
}

/// Playback start for a chosen best frame: its timestamp minus a short
/// lead-in, clamped to the start of the clip.
pub fn trim_point_for_frame(duration: f64, frames: usize, best_frame: usize) -> f64 {
    let step = duration / (frames as f64 + 1.0);
    (step * best_frame as f64 - TRIM_LEAD_IN).max(0.0)
}

/// Extract and base64-encode sampled frames, keeping each frame's 1-based
/// index so a skipped dark frame never shifts the numbering the model sees.
async fn sample_frames(video: &Path, duration: f64, count: usize) -> Result<Vec<(usize, String)>> {
    let scratch = std::env::temp_dir().join("shortsmith_frames");
    std::fs::create_dir_all(&scratch)?;

    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame");

    let mut frames = Vec::with_capacity(count);
    for (i, ts) in sample_timestamps(duration, count).into_iter().enumerate() {
        let index = i + 1;
        let frame_path = scratch.join(format!("{stem}_{index}.jpg"));
        if let Err(e) = media::extract_frame(video, ts, &frame_path).await {
            warn!("[VISION] frame {} at {:.2}s failed: {e:#}", index, ts);
            continue;
        }
        if !media::frame_is_informative(&frame_path) {
            debug!("[VISION] frame {} at {:.2}s is near-black, skipping", index, ts);
            let _ = std::fs::remove_file(&frame_path);
            continue;
        }
        let bytes = std::fs::read(&frame_path)
            .with_context(|| format!("could not read extracted frame {:?}", frame_path))?;
        frames.push((index, BASE64.encode(bytes)));
        let _ = std::fs::remove_file(&frame_path);
    }

    if frames.is_empty() {
        bail!("no usable frames could be sampled from {:?}", video);
    }
    Ok(frames)
}

/// Pre-render gate: does the footage actually show what its description
/// claims?
pub struct VisionReviewer {
    llm: Arc<LlmClient>,
}

impl VisionReviewer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AssetVerifier for VisionReviewer {
    async fn verify(&self, asset: &CandidateAsset) -> Result<Verification> {
        let frames = sample_frames(&asset.path, asset.duration, VERIFY_FRAMES).await?;
        info!(
            "[VISION] reviewing clip {} ({} frames) against '{}'",
            asset.id,
            frames.len(),
            asset.description
        );

        let system = "You review stock footage frames for a fact video. \
                      Reply with JSON: {\"matches\": true|false, \
                      \"best_frame\": <frame number>, \"explanation\": \"...\"}.";
        let question = format!(
            "The footage is described as: \"{}\". \
             Do these frames clearly show that subject, live and in motion? \
             Statues, drawings, and unrelated scenery do not count. \
             If they match, pick the frame number where the subject is clearest.",
            asset.description
        );

        let reply = self.llm.vision_json(system, &question, &frames, 200).await?;

        let approved = reply["matches"]
            .as_bool()
            .ok_or_else(|| anyhow!("verifier reply had no matches field"))?;
        let explanation = reply["explanation"].as_str().unwrap_or_default().to_string();
        let best_frame = reply["best_frame"].as_u64().unwrap_or(1).clamp(1, VERIFY_FRAMES as u64) as usize;

        let trim_point = if approved {
            trim_point_for_frame(asset.duration, VERIFY_FRAMES, best_frame)
        } else {
            0.0
        };

        Ok(Verification {
            approved,
            explanation,
            trim_point,
            best_frame,
        })
    }
}

/// Post-render gate: is the subject still recognizable in the finished
/// artifact, text band and all?
pub struct ArtifactAuditor {
    llm: Arc<LlmClient>,
}

impl ArtifactAuditor {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FinalAuditor for ArtifactAuditor {
    async fn audit(&self, artifact: &Path, fact: &GeneratedFact) -> Result<bool> {
        let duration = media::video_duration(artifact).await?;
        let frames = sample_frames(artifact, duration, AUDIT_FRAMES).await?;
        info!("[VISION] auditing final artifact ({} frames)", frames.len());

        let system = "You audit finished short videos. \
                      Reply with JSON: {\"approved\": true|false, \"explanation\": \"...\"}.";
        let question = format!(
            "This video presents the fact: \"{}\". The hook shown on screen is: \"{}\". \
             Is the footage behind the text plausibly related to that fact, \
             and is the text readable? Reject only clear mismatches.",
            fact.fact_text, fact.hook
        );

        let reply = self.llm.vision_json(system, &question, &frames, 150).await?;
        let approved = reply["approved"]
            .as_bool()
            .ok_or_else(|| anyhow!("auditor reply had no approved field"))?;
        if !approved {
            info!(
                "[VISION] auditor rejected artifact: {}",
                reply["explanation"].as_str().unwrap_or("no explanation")
            );
        }
        Ok(approved)
    }
}
