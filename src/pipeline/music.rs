// Shortsmith Music - mood-matched background track selection
//
// Music is strictly optional. An empty library yields Ok(None), and every
// other failure inside the picker degrades to a random track rather than
// an error, so a silent video only happens when there is nothing to play.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::pipeline::{GeneratedFact, MusicPicker, MusicTrack};

/// How many tracks are offered to the model per pick.
const SAMPLE_SIZE: usize = 3;

pub struct MoodMusicPicker {
    llm: Arc<LlmClient>,
    music_dir: PathBuf,
    rng: Mutex<StdRng>,
}

impl MoodMusicPicker {
    pub fn new(llm: Arc<LlmClient>, music_dir: &Path, rng: StdRng) -> Self {
        Self {
            llm,
            music_dir: music_dir.to_path_buf(),
            rng: Mutex::new(rng),
        }
    }

    fn library(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.music_dir) else {
            return Vec::new();
        };
        let mut tracks: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("mp3"))
                    .unwrap_or(false)
            })
            .collect();
        tracks.sort();
        tracks
    }

    async fn mood_pick(&self, fact: &GeneratedFact, sample: &[PathBuf]) -> Result<usize> {
        let listing: String = sample
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}\n", i, track_title(p)))
            .collect();

        let system = "You match background music to short videos. \
                      Reply with JSON: {\"best_index\": <number>}.";
        let user = format!(
            "Fact: {}\nCategory: {}\n\nAvailable tracks:\n{}\n\
             Pick the track whose mood best fits this fact. \
             Judge by the track names.",
            fact.fact_text, fact.category, listing
        );

        let reply = self.llm.chat_json(system, &user, 0.3, 60).await?;
        let index = reply["best_index"]
            .as_u64()
            .ok_or_else(|| anyhow!("music reply had no best_index"))? as usize;
        if index >= sample.len() {
            return Err(anyhow!("music pick {} out of {} tracks", index, sample.len()));
        }
        Ok(index)
    }
}

#[async_trait]
impl MusicPicker for MoodMusicPicker {
    async fn pick(&self, fact: &GeneratedFact) -> Result<Option<MusicTrack>> {
        let library = self.library();
        if library.is_empty() {
            info!("[MUSIC] no tracks in {:?}, rendering without music", self.music_dir);
            return Ok(None);
        }

        let sample: Vec<PathBuf> = {
            let mut rng = self.rng.lock().map_err(|_| anyhow!("music rng poisoned"))?;
            library
                .choose_multiple(&mut *rng, SAMPLE_SIZE.min(library.len()))
                .cloned()
                .collect()
        };

        let index = match self.mood_pick(fact, &sample).await {
            Ok(i) => i,
            Err(e) => {
                warn!("[MUSIC] mood pick failed ({e:#}), choosing at random");
                let mut rng = self.rng.lock().map_err(|_| anyhow!("music rng poisoned"))?;
                rng.gen_range(0..sample.len())
            }
        };

        let path = sample[index].clone();
        let title = track_title(&path);
        info!("[MUSIC] picked '{}'", title);
        Ok(Some(MusicTrack { path, title }))
    }
}

fn track_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .replace(['_', '-'], " ")
}
