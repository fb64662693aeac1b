// Shortsmith Pipeline - Acceptance pipeline and its collaborators
//
// The controller composes six capabilities behind trait seams. Everything
// that crosses a seam is an immutable value record produced by one stage
// and consumed by the next; the only mutation in the model is the
// controller filling in `GeneratedFact::independent_score`.

pub mod composer;
pub mod controller;
pub mod facts;
pub mod media;
pub mod music;
pub mod overlay;
pub mod stock;
pub mod topics;
pub mod uploader;
pub mod vision;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

/// One fetched (and locally cached) stock footage asset.
#[derive(Debug, Clone)]
pub struct CandidateAsset {
    /// Source-assigned identity; also keys the on-disk cache.
    pub id: u64,
    pub path: PathBuf,
    /// Natural-language description of what the footage shows.
    pub description: String,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Verdict on a candidate asset from the vision gate.
#[derive(Debug, Clone)]
pub struct Verification {
    pub approved: bool,
    pub explanation: String,
    /// Recommended playback start within the source footage (seconds).
    pub trim_point: f64,
    /// 1-based index of the sampled frame that shows the subject best.
    pub best_frame: usize,
}

/// An LLM-authored fact unit.
///
/// `self_score` is the generator's own assessment and is used for logging
/// only. The quality gate reads `independent_score`, assigned later by a
/// cold second opinion that never sees the asset or topic.
#[derive(Debug, Clone)]
pub struct GeneratedFact {
    pub hook: String,
    pub fact_text: String,
    pub highlight_words: Vec<String>,
    pub category: String,
    pub self_score: u8,
    pub independent_score: Option<u8>,
}

/// A chosen background music track.
#[derive(Debug, Clone)]
pub struct MusicTrack {
    pub path: PathBuf,
    pub title: String,
}

/// The composed output video.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Fetches one candidate asset for a topic. Called repeatedly; each call
/// may return a different candidate or fail.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch_candidate(&self, topic: &str, min_duration: u32) -> Result<CandidateAsset>;
}

/// Decides whether an asset really shows what its description claims.
#[async_trait]
pub trait AssetVerifier: Send + Sync {
    async fn verify(&self, asset: &CandidateAsset) -> Result<Verification>;
}

/// Generates fact content and, separately, scores it cold.
///
/// `score` deliberately takes only the written content - never the asset
/// or topic - so the second opinion stays uncorrelated with generation.
#[async_trait]
pub trait FactWriter: Send + Sync {
    async fn generate_for_asset(&self, asset_description: &str) -> Result<GeneratedFact>;
    async fn score(&self, hook: &str, fact_text: &str) -> Result<u8>;
    async fn related_topic(&self, topic: &str) -> Result<String>;
}

/// Picks a background track to match the fact's mood. `None` means no
/// music is available; errors degrade to no music at the call site.
#[async_trait]
pub trait MusicPicker: Send + Sync {
    async fn pick(&self, fact: &GeneratedFact) -> Result<Option<MusicTrack>>;
}

/// Composes the final video from the verified asset and generated fact.
#[async_trait]
pub trait Composer: Send + Sync {
    async fn render(
        &self,
        asset: &CandidateAsset,
        trim_point: f64,
        duration_secs: u32,
        fact: &GeneratedFact,
        music: Option<&MusicTrack>,
        output: &Path,
    ) -> Result<RenderedArtifact>;
}

/// Confirms the subject is still recognizable in the finished artifact.
#[async_trait]
pub trait FinalAuditor: Send + Sync {
    async fn audit(&self, artifact: &Path, fact: &GeneratedFact) -> Result<bool>;
}
