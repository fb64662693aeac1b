// Shortsmith Stock Footage - Pexels search, selection, and asset cache
//
// Fetching a candidate is a three step affair: search Pexels for portrait
// footage, let a selector pick the most promising hit, then download it
// into the content-addressed cache. Selection sits behind its own trait so
// the LLM picker can be wrapped with a random fallback; a broken model
// should cost us quality, not the whole run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::pipeline::{media, AssetSource, CandidateAsset};

const PER_PAGE: u32 = 80;
const MAX_SEARCH_PAGE: u32 = 5;
const SELECTION_POOL: usize = 15;
const TARGET_HEIGHT: i64 = 1920;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsHit>,
}

#[derive(Debug, Deserialize)]
struct PexelsHit {
    id: u64,
    duration: f64,
    url: String,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct PexelsFile {
    link: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// A search hit that survived filtering, ready for selection.
#[derive(Debug, Clone)]
pub struct StockCandidate {
    pub id: u64,
    pub description: String,
    pub duration: f64,
    pub download_url: String,
    pub width: u32,
    pub height: u32,
}

/// Picks one candidate out of a shuffled pool.
#[async_trait]
pub trait CandidateSelector: Send + Sync {
    async fn select(&self, topic: &str, pool: &[StockCandidate]) -> Result<usize>;
}

/// Asks the model which clip best shows the topic. Rejects footage the
/// descriptions mark as statues, monuments, or generic scenery.
pub struct LlmSelector {
    llm: Arc<LlmClient>,
}

impl LlmSelector {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CandidateSelector for LlmSelector {
    async fn select(&self, topic: &str, pool: &[StockCandidate]) -> Result<usize> {
        let listing: String = pool
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {} ({:.0}s)\n", i, c.description, c.duration))
            .collect();

        let system = "You select stock footage for short vertical videos. \
                      Reply with JSON: {\"best_index\": <number>, \"reason\": \"...\"}.";
        let user = format!(
            "Topic: {topic}\n\nCandidate clips:\n{listing}\n\
             Pick the clip that most clearly shows a living, moving example of the topic. \
             Avoid statues, monuments, drawings, and generic scenery. \
             Avoid clips whose description is vague or boring."
        );

        let reply = self.llm.chat_json(system, &user, 0.2, 150).await?;
        let index = reply["best_index"]
            .as_u64()
            .ok_or_else(|| anyhow!("selector reply had no best_index"))? as usize;
        if index >= pool.len() {
            bail!("selector picked index {} out of {} candidates", index, pool.len());
        }
        debug!(
            "[STOCK] selector chose {}: {}",
            index,
            reply["reason"].as_str().unwrap_or("no reason given")
        );
        Ok(index)
    }
}

/// Uniform random pick. Never fails on a non-empty pool.
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn new(rng: StdRng) -> Self {
        Self { rng: Mutex::new(rng) }
    }
}

#[async_trait]
impl CandidateSelector for RandomSelector {
    async fn select(&self, _topic: &str, pool: &[StockCandidate]) -> Result<usize> {
        if pool.is_empty() {
            bail!("no candidates to select from");
        }
        let mut rng = self.rng.lock().map_err(|_| anyhow!("selector rng poisoned"))?;
        Ok(rng.gen_range(0..pool.len()))
    }
}

/// Wraps a primary selector with a fallback that takes over when the
/// primary errors out.
pub struct SelectorWithFallback {
    primary: Box<dyn CandidateSelector>,
    fallback: Box<dyn CandidateSelector>,
}

impl SelectorWithFallback {
    pub fn new(primary: Box<dyn CandidateSelector>, fallback: Box<dyn CandidateSelector>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl CandidateSelector for SelectorWithFallback {
    async fn select(&self, topic: &str, pool: &[StockCandidate]) -> Result<usize> {
        match self.primary.select(topic, pool).await {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("[STOCK] primary selector failed ({e:#}), falling back");
                self.fallback.select(topic, pool).await
            }
        }
    }
}

/// Pexels-backed asset source with an on-disk download cache.
pub struct PexelsSource {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    cache_dir: PathBuf,
    selector: Box<dyn CandidateSelector>,
    rng: Mutex<StdRng>,
}

impl PexelsSource {
    pub fn new(
        api_url: &str,
        api_key: &str,
        cache_dir: &Path,
        selector: Box<dyn CandidateSelector>,
        rng: StdRng,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            selector,
            rng: Mutex::new(rng),
        }
    }

    async fn search(&self, topic: &str, min_duration: u32) -> Result<Vec<StockCandidate>> {
        let page = {
            let mut rng = self.rng.lock().map_err(|_| anyhow!("source rng poisoned"))?;
            rng.gen_range(1..=MAX_SEARCH_PAGE)
        };

        let per_page = PER_PAGE.to_string();
        let page_s = page.to_string();
        let resp = self
            .http
            .get(format!("{}/search", self.api_url))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", topic),
                ("orientation", "portrait"),
                ("size", "medium"),
                ("per_page", per_page.as_str()),
                ("page", page_s.as_str()),
            ])
            .send()
            .await
            .context("Pexels search request failed")?;

        if !resp.status().is_success() {
            bail!("Pexels API error: {}", resp.status());
        }

        let body: SearchResponse = resp.json().await.context("Pexels response was not JSON")?;
        info!("[STOCK] page {} returned {} hits for '{}'", page, body.videos.len(), topic);

        let mut candidates: Vec<StockCandidate> = body
            .videos
            .into_iter()
            .filter(|hit| hit.duration >= min_duration as f64)
            .filter_map(|hit| {
                let file = best_portrait_file(&hit.video_files)?;
                Some(StockCandidate {
                    id: hit.id,
                    description: description_from_url(&hit.url),
                    duration: hit.duration,
                    download_url: file.link.clone(),
                    width: file.width,
                    height: file.height,
                })
            })
            .filter(|c| description_is_usable(&c.description))
            .collect();

        {
            let mut rng = self.rng.lock().map_err(|_| anyhow!("source rng poisoned"))?;
            candidates.shuffle(&mut *rng);
        }
        candidates.truncate(SELECTION_POOL);
        Ok(candidates)
    }

    async fn download(&self, candidate: &StockCandidate) -> Result<PathBuf> {
        if let Some(path) = cache_lookup(&self.cache_dir, candidate.id) {
            info!("[STOCK] cache hit for clip {}", candidate.id);
            return Ok(path);
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        let path = cached_asset_path(&self.cache_dir, candidate.id);

        let resp = self
            .http
            .get(&candidate.download_url)
            .send()
            .await
            .context("footage download failed")?;
        if !resp.status().is_success() {
            bail!("footage download returned {}", resp.status());
        }
        let bytes = resp.bytes().await.context("footage download truncated")?;
        std::fs::write(&path, &bytes)
            .with_context(|| format!("could not write {:?}", path))?;
        write_cache_sidecar(&path)?;

        info!("[STOCK] downloaded clip {} ({} bytes)", candidate.id, bytes.len());
        Ok(path)
    }
}

#[async_trait]
impl AssetSource for PexelsSource {
    async fn fetch_candidate(&self, topic: &str, min_duration: u32) -> Result<CandidateAsset> {
        let pool = self.search(topic, min_duration).await?;
        if pool.is_empty() {
            bail!("no usable footage found for '{topic}'");
        }

        let index = self.selector.select(topic, &pool).await?;
        let chosen = &pool[index];
        let path = self.download(chosen).await?;

        // Trust the probe over the API metadata once the file is local.
        let duration = media::video_duration(&path).await?;
        let (width, height) = media::video_dimensions(&path).await?;

        Ok(CandidateAsset {
            id: chosen.id,
            path,
            description: chosen.description.clone(),
            duration,
            width,
            height,
        })
    }
}

/// Pexels encodes the human description in the video page URL slug.
/// `https://www.pexels.com/video/a-lion-walking-855321/` -> "a lion walking".
pub fn description_from_url(url: &str) -> String {
    let slug = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let words: Vec<&str> = slug.split('-').collect();
    let keep = match words.last() {
        Some(last) if last.chars().all(|c| c.is_ascii_digit()) && !last.is_empty() => {
            &words[..words.len() - 1]
        }
        _ => &words[..],
    };
    keep.join(" ").trim().to_string()
}

/// A slug shorter than three words ("video", "drone shot") says nothing
/// the fact writer can work with.
fn description_is_usable(description: &str) -> bool {
    description.split_whitespace().count() >= 3
}

/// Portrait rendition closest to the target 1920px frame height.
fn best_portrait_file(files: &[PexelsFile]) -> Option<&PexelsFile> {
    files
        .iter()
        .filter(|f| f.height > f.width && f.height > 0)
        .min_by_key(|f| (f.height as i64 - TARGET_HEIGHT).abs())
}

pub fn cached_asset_path(cache_dir: &Path, id: u64) -> PathBuf {
    cache_dir.join(format!("pexels_{id}.mp4"))
}

fn sidecar_path(asset: &Path) -> PathBuf {
    let mut p = asset.as_os_str().to_owned();
    p.push(".sha256");
    PathBuf::from(p)
}

fn file_sha256(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Record the digest of a freshly downloaded asset next to it.
pub fn write_cache_sidecar(asset: &Path) -> Result<()> {
    let digest = file_sha256(asset)?;
    std::fs::write(sidecar_path(asset), digest)?;
    Ok(())
}

/// Returns the cached asset path when the file exists and still matches
/// its recorded digest. A missing or stale sidecar forces a re-download.
pub fn cache_lookup(cache_dir: &Path, id: u64) -> Option<PathBuf> {
    let path = cached_asset_path(cache_dir, id);
    if !path.is_file() {
        return None;
    }
    let recorded = std::fs::read_to_string(sidecar_path(&path)).ok()?;
    let actual = file_sha256(&path).ok()?;
    if recorded.trim() == actual {
        Some(path)
    } else {
        warn!("[STOCK] cache entry for clip {} failed digest check", id);
        None
    }
}
