// Shortsmith Controller - the acceptance pipeline
//
// Two nested retry loops drive a run. The inner loop spends up to five
// asset attempts getting one clip past the vision gate; the outer loop
// restarts the whole attempt, usually on a fresh topic, when anything
// downstream of the asset fails. A run ends in exactly one acceptance or
// one of two exhaustion errors.
//
// Failure polarity is deliberate and asymmetric. The verification gate
// fails closed: an error there is a rejection. The final audit fails
// open: an error there is an acceptance, because by that point a finished
// artifact exists and an unreachable reviewer is not a reason to burn it.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::topics::TopicPicker;
use crate::pipeline::{
    AssetSource, AssetVerifier, CandidateAsset, Composer, FactWriter, FinalAuditor, GeneratedFact,
    MusicPicker, MusicTrack, RenderedArtifact,
};

/// Chance that a retry stays near the failed topic instead of rotating
/// to a fresh one.
const RELATED_TOPIC_PROBABILITY: f64 = 0.75;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fixed topic; `None` draws from the rotation catalogue.
    pub topic: Option<String>,
    pub duration_secs: u32,
    pub with_music: bool,
    /// Explicit output path; `None` derives one under `output_dir`.
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    /// Asset fetch+verify attempts per outer attempt.
    pub inner_asset_attempts: u32,
    /// Full pipeline attempts per run.
    pub outer_attempts: u32,
    /// Minimum independent score (1-10) a fact must reach.
    pub interest_threshold: u8,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            inner_asset_attempts: 5,
            outer_attempts: 10,
            interest_threshold: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no verifiable footage after {fetch_attempts} fetches across {outer_attempts} attempts")]
    AssetsExhausted { fetch_attempts: u32, outer_attempts: u32 },
    #[error("no fact reached the bar in {attempts} attempts (best score {best_score})")]
    QualityExhausted { attempts: u32, best_score: u8 },
}

/// A successful run.
#[derive(Debug)]
pub struct Acceptance {
    pub artifact: RenderedArtifact,
    pub fact: GeneratedFact,
    pub music: Option<MusicTrack>,
    pub outer_attempts: u32,
}

/// Why one outer attempt went back around.
enum AttemptOutcome {
    NoAsset,
    GenerationFailed,
    ScoringFailed,
    LowScore(u8),
    RenderFailed,
    AuditRejected,
}

pub struct Pipeline {
    source: Arc<dyn AssetSource>,
    verifier: Arc<dyn AssetVerifier>,
    writer: Arc<dyn FactWriter>,
    music: Arc<dyn MusicPicker>,
    composer: Arc<dyn Composer>,
    auditor: Arc<dyn FinalAuditor>,
    topics: TopicPicker,
    limits: PipelineLimits,
    rng: StdRng,
    fetch_attempts: u32,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn AssetSource>,
        verifier: Arc<dyn AssetVerifier>,
        writer: Arc<dyn FactWriter>,
        music: Arc<dyn MusicPicker>,
        composer: Arc<dyn Composer>,
        auditor: Arc<dyn FinalAuditor>,
        topics: TopicPicker,
        limits: PipelineLimits,
        rng: StdRng,
    ) -> Self {
        Self {
            source,
            verifier,
            writer,
            music,
            composer,
            auditor,
            topics,
            limits,
            rng,
            fetch_attempts: 0,
        }
    }

    /// Run the pipeline to one acceptance or exhaustion. An explicitly
    /// requested topic is pinned for the whole run; rotation and related
    /// pivots only apply to catalogue-drawn topics.
    pub async fn run(&mut self, request: &GenerationRequest) -> Result<Acceptance, PipelineError> {
        self.fetch_attempts = 0;
        let pinned = request.topic.is_some();
        let mut topic = match &request.topic {
            Some(t) => t.clone(),
            None => self.topics.draw(),
        };
        let mut best_score: u8 = 0;
        let mut scored_anything = false;

        for attempt in 1..=self.limits.outer_attempts {
            info!(
                "[PIPELINE] attempt {}/{} on topic '{}'",
                attempt, self.limits.outer_attempts, topic
            );

            let outcome = self.attempt(request, &topic).await;
            match outcome {
                Ok(acceptance) => {
                    info!(
                        "[PIPELINE] accepted after {} attempt(s): {:?}",
                        attempt,
                        acceptance.artifact.path.file_name()
                    );
                    return Ok(Acceptance { outer_attempts: attempt, ..acceptance });
                }
                Err(reason) => {
                    match &reason {
                        AttemptOutcome::NoAsset => {
                            info!("[PIPELINE] attempt {} found no verifiable footage", attempt)
                        }
                        AttemptOutcome::GenerationFailed => {
                            warn!("[PIPELINE] attempt {} could not generate a fact", attempt)
                        }
                        AttemptOutcome::ScoringFailed => {
                            warn!("[PIPELINE] attempt {} could not score its fact", attempt)
                        }
                        AttemptOutcome::LowScore(score) => {
                            scored_anything = true;
                            best_score = best_score.max(*score);
                            info!(
                                "[PIPELINE] attempt {} scored {}/{}, below the bar",
                                attempt, score, self.limits.interest_threshold
                            );
                        }
                        AttemptOutcome::RenderFailed => {
                            warn!("[PIPELINE] attempt {} failed to render", attempt)
                        }
                        AttemptOutcome::AuditRejected => {
                            info!("[PIPELINE] attempt {} rejected by the final audit", attempt)
                        }
                    }

                    if !pinned {
                        topic = self.next_topic().await;
                    }
                }
            }
        }

        if scored_anything {
            Err(PipelineError::QualityExhausted {
                attempts: self.limits.outer_attempts,
                best_score,
            })
        } else {
            Err(PipelineError::AssetsExhausted {
                fetch_attempts: self.fetch_attempts,
                outer_attempts: self.limits.outer_attempts,
            })
        }
    }

    /// One full outer attempt: asset, fact, score, music, render, audit.
    async fn attempt(
        &mut self,
        request: &GenerationRequest,
        topic: &str,
    ) -> Result<Acceptance, AttemptOutcome> {
        let (asset, trim_point) = self
            .find_verified_asset(topic, request.duration_secs)
            .await
            .ok_or(AttemptOutcome::NoAsset)?;

        let mut fact = match self.writer.generate_for_asset(&asset.description).await {
            Ok(f) => f,
            Err(e) => {
                warn!("[PIPELINE] fact generation failed: {e:#}");
                return Err(AttemptOutcome::GenerationFailed);
            }
        };

        // Independent second opinion on the written words alone.
        let score = match self.writer.score(&fact.hook, &fact.fact_text).await {
            Ok(s) => s,
            Err(e) => {
                warn!("[PIPELINE] scoring failed: {e:#}");
                return Err(AttemptOutcome::ScoringFailed);
            }
        };
        fact.independent_score = Some(score);
        if score < self.limits.interest_threshold {
            return Err(AttemptOutcome::LowScore(score));
        }

        // Music is best effort; a broken picker never blocks an
        // otherwise good video.
        let music = if request.with_music {
            match self.music.pick(&fact).await {
                Ok(track) => track,
                Err(e) => {
                    warn!("[PIPELINE] music selection failed ({e:#}), continuing without");
                    None
                }
            }
        } else {
            None
        };

        let output = self.output_path(request, &fact);
        let artifact = match self
            .composer
            .render(
                &asset,
                trim_point,
                request.duration_secs,
                &fact,
                music.as_ref(),
                &output,
            )
            .await
        {
            Ok(a) => a,
            Err(e) => {
                warn!("[PIPELINE] render failed: {e:#}");
                // A half-written output must not outlive the attempt.
                let _ = std::fs::remove_file(&output);
                return Err(AttemptOutcome::RenderFailed);
            }
        };

        match self.auditor.audit(&artifact.path, &fact).await {
            Ok(true) => {}
            Ok(false) => {
                // Honest rejection: discard the artifact and go around.
                let _ = std::fs::remove_file(&artifact.path);
                return Err(AttemptOutcome::AuditRejected);
            }
            Err(e) => {
                warn!("[PIPELINE] final audit unavailable ({e:#}), accepting anyway");
            }
        }

        Ok(Acceptance {
            artifact,
            fact,
            music,
            outer_attempts: 0,
        })
    }

    /// Inner loop: spend the per-attempt asset budget getting one clip
    /// past the vision gate. Fetch and verification errors both count as
    /// spent attempts.
    async fn find_verified_asset(
        &mut self,
        topic: &str,
        min_duration: u32,
    ) -> Option<(CandidateAsset, f64)> {
        for inner in 1..=self.limits.inner_asset_attempts {
            self.fetch_attempts += 1;
            let asset = match self.source.fetch_candidate(topic, min_duration).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("[PIPELINE] fetch {}/{} failed: {e:#}", inner, self.limits.inner_asset_attempts);
                    continue;
                }
            };

            match self.verifier.verify(&asset).await {
                Ok(v) if v.approved => {
                    info!(
                        "[PIPELINE] clip {} approved on attempt {} (best frame {})",
                        asset.id, inner, v.best_frame
                    );
                    return Some((asset, v.trim_point));
                }
                Ok(v) => {
                    info!("[PIPELINE] clip {} rejected: {}", asset.id, v.explanation);
                }
                Err(e) => {
                    // Fail closed: an unverifiable clip is a rejected clip.
                    warn!("[PIPELINE] verification of clip {} failed: {e:#}", asset.id);
                }
            }
        }
        None
    }

    /// Topic for the next outer attempt. The failed topic is abandoned:
    /// a fresh unused hint comes out of the rotation, and most of the
    /// time the model expands it into a nearby angle.
    async fn next_topic(&mut self) -> String {
        let fresh = self.topics.draw();
        if self.rng.gen_bool(RELATED_TOPIC_PROBABILITY) {
            match self.writer.related_topic(&fresh).await {
                Ok(suggestion) => {
                    info!("[PIPELINE] expanding '{}' into '{}'", fresh, suggestion);
                    return suggestion;
                }
                Err(e) => {
                    warn!("[PIPELINE] topic expansion failed ({e:#}), using '{}'", fresh);
                }
            }
        }
        fresh
    }

    fn output_path(&self, request: &GenerationRequest, fact: &GeneratedFact) -> PathBuf {
        if let Some(path) = &request.output {
            return path.clone();
        }
        let safe_category: String = fact
            .category
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        request
            .output_dir
            .join(format!("short_{safe_category}_{stamp}.mp4"))
    }
}
