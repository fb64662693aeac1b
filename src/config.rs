// Shortsmith Settings - Environment-backed configuration
//
// Everything the pipeline needs from the outside world is resolved here,
// before any collaborator is constructed. Validation reports every missing
// required value at once so the process can fail fast with a useful message.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Application settings, loaded once from the environment (after dotenv).
#[derive(Debug, Clone)]
pub struct Settings {
    // API credentials
    pub openai_api_key: String,
    pub pexels_api_key: String,

    // Endpoint overrides (tests point these at local stubs)
    pub openai_api_url: String,
    pub pexels_api_url: String,

    // Video geometry
    pub video_width: u32,
    pub video_height: u32,
    /// Height of the footage band at the bottom of the frame.
    pub video_band_height: u32,
    /// Padding below the footage band.
    pub bottom_padding: u32,
    pub fps: u32,
    pub default_duration_secs: u32,

    // Text overlay
    pub font_size_hook: u32,
    pub font_size_fact: u32,

    // Channel branding
    pub channel_name: String,
    pub channel_handle: String,

    // Directories
    pub video_cache_dir: PathBuf,
    pub music_dir: PathBuf,
    pub output_dir: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            pexels_api_key: env::var("PEXELS_API_KEY").unwrap_or_default(),
            openai_api_url: env_or("OPENAI_API_URL", "https://api.openai.com/v1"),
            pexels_api_url: env_or("PEXELS_API_URL", "https://api.pexels.com/videos"),
            video_width: 1080,
            video_height: 1920,
            video_band_height: 750,
            bottom_padding: 180,
            fps: 30,
            default_duration_secs: 8,
            font_size_hook: 64,
            font_size_fact: 42,
            channel_name: env_or("CHANNEL_NAME", "Daily Incredible Facts"),
            channel_handle: env_or("CHANNEL_HANDLE", "@daily_incredible_facts"),
            video_cache_dir: env_or("VIDEO_CACHE_DIR", "cache/videos").into(),
            music_dir: env_or("MUSIC_DIR", "assets/music").into(),
            output_dir: env_or("OUTPUT_DIR", "output").into(),
        }
    }

    /// Height of the text band above the footage.
    pub fn text_band_height(&self) -> u32 {
        self.video_height - self.video_band_height - self.bottom_padding
    }

    /// Returns a list of configuration errors. Empty means ready to run.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.openai_api_key.is_empty() {
            errors.push("OPENAI_API_KEY not set".to_string());
        }
        if self.pexels_api_key.is_empty() {
            errors.push("PEXELS_API_KEY not set".to_string());
        }
        errors
    }

    /// Create the cache/music/output directories if they don't exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.video_cache_dir)?;
        std::fs::create_dir_all(&self.music_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}
