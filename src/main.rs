// Shortsmith Main Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use shortsmith::config::Settings;
use shortsmith::llm::LlmClient;
use shortsmith::pipeline::composer::FfmpegComposer;
use shortsmith::pipeline::controller::{GenerationRequest, Pipeline, PipelineLimits};
use shortsmith::pipeline::facts::FactGenerator;
use shortsmith::pipeline::media;
use shortsmith::pipeline::music::MoodMusicPicker;
use shortsmith::pipeline::stock::{LlmSelector, PexelsSource, RandomSelector, SelectorWithFallback};
use shortsmith::pipeline::topics::TopicPicker;
use shortsmith::pipeline::uploader::YouTubeUploader;
use shortsmith::pipeline::vision::{ArtifactAuditor, VisionReviewer};

#[derive(Parser)]
#[command(name = "shortsmith")]
#[command(about = "Vertical fact video generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify configuration and external tools
    Check,

    /// Generate one video
    Generate {
        /// Fixed topic (default: rotate through the catalogue)
        #[arg(short, long)]
        topic: Option<String>,

        /// Target duration in seconds
        #[arg(short, long, default_value = "8")]
        duration: u32,

        /// Render without background music
        #[arg(long)]
        no_music: bool,

        /// Directory of mp3 tracks to draw music from
        #[arg(long)]
        music_dir: Option<PathBuf>,

        /// Path to output video file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate several videos in a row
    Batch {
        /// How many videos to produce
        #[arg(short, long, default_value = "3")]
        count: u32,

        /// Fixed topic for every video
        #[arg(short, long)]
        topic: Option<String>,

        /// Target duration in seconds
        #[arg(short, long, default_value = "8")]
        duration: u32,
    },

    /// Generate one video and upload it to YouTube
    Auto {
        /// Fixed topic (default: rotate through the catalogue)
        #[arg(short, long)]
        topic: Option<String>,

        /// Target duration in seconds
        #[arg(short, long, default_value = "8")]
        duration: u32,

        /// Privacy status for the upload
        #[arg(long, default_value = "public")]
        privacy: String,

        /// Generate only; skip the upload step
        #[arg(long)]
        no_upload: bool,
    },
}


fn build_pipeline(settings: &Settings) -> Pipeline {
    let llm = Arc::new(LlmClient::new(&settings.openai_api_url, &settings.openai_api_key));

    let selector = SelectorWithFallback::new(
        Box::new(LlmSelector::new(llm.clone())),
        Box::new(RandomSelector::new(StdRng::from_entropy())),
    );
    let source = PexelsSource::new(
        &settings.pexels_api_url,
        &settings.pexels_api_key,
        &settings.video_cache_dir,
        Box::new(selector),
        StdRng::from_entropy(),
    );

    Pipeline::new(
        Arc::new(source),
        Arc::new(VisionReviewer::new(llm.clone())),
        Arc::new(FactGenerator::new(llm.clone())),
        Arc::new(MoodMusicPicker::new(
            llm.clone(),
            &settings.music_dir,
            StdRng::from_entropy(),
        )),
        Arc::new(FfmpegComposer::new(settings, StdRng::from_entropy())),
        Arc::new(ArtifactAuditor::new(llm)),
        TopicPicker::new(StdRng::from_entropy()),
        PipelineLimits::default(),
        StdRng::from_entropy(),
    )
}

async fn run_check(settings: &Settings) -> bool {
    let mut ok = true;
    for problem in settings.validate() {
        error!("[CHECK] {}", problem);
        ok = false;
    }
    if media::check_ffmpeg().await {
        info!("[CHECK] ffmpeg found");
    } else {
        error!("[CHECK] ffmpeg not found on PATH");
        ok = false;
    }
    match YouTubeUploader::from_env() {
        Ok(_) => info!("[CHECK] upload credentials present"),
        Err(e) => warn!("[CHECK] uploads unavailable: {}", e),
    }
    if ok {
        info!("[CHECK] ready to generate");
    }
    ok
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Cli::parse();
    let settings = Settings::from_env();

    if let Commands::Check = args.command {
        if !run_check(&settings).await {
            std::process::exit(1);
        }
        return;
    }

    let problems = settings.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("[CONFIG] {}", problem);
        }
        std::process::exit(1);
    }
    if let Err(e) = settings.ensure_dirs() {
        error!("[CONFIG] could not create working directories: {e:#}");
        std::process::exit(1);
    }

    match args.command {
        Commands::Check => unreachable!(),

        Commands::Generate { topic, duration, no_music, music_dir, output } => {
            let mut settings = settings;
            if let Some(dir) = music_dir {
                settings.music_dir = dir;
            }
            let request = GenerationRequest {
                topic,
                duration_secs: duration,
                with_music: !no_music,
                output,
                output_dir: settings.output_dir.clone(),
            };
            let mut pipeline = build_pipeline(&settings);
            match pipeline.run(&request).await {
                Ok(accepted) => {
                    info!(
                        "[DONE] {:?} (score {:?}, {} attempt(s))",
                        accepted.artifact.path,
                        accepted.fact.independent_score,
                        accepted.outer_attempts
                    );
                }
                Err(e) => {
                    error!("[FAILED] {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Batch { count, topic, duration } => {
            let mut produced = 0;
            let mut pipeline = build_pipeline(&settings);
            for n in 1..=count {
                info!("[BATCH] video {}/{}", n, count);
                let request = GenerationRequest {
                    topic: topic.clone(),
                    duration_secs: duration,
                    with_music: true,
                    output: None,
                    output_dir: settings.output_dir.clone(),
                };
                match pipeline.run(&request).await {
                    Ok(accepted) => {
                        produced += 1;
                        info!("[BATCH] {:?} done", accepted.artifact.path.file_name());
                    }
                    Err(e) => warn!("[BATCH] video {} failed: {}", n, e),
                }
            }
            info!("[BATCH] produced {}/{} videos", produced, count);
            if produced == 0 {
                std::process::exit(1);
            }
        }

        Commands::Auto { topic, duration, privacy, no_upload } => {
            let request = GenerationRequest {
                topic,
                duration_secs: duration,
                with_music: true,
                output: None,
                output_dir: settings.output_dir.clone(),
            };
            // Credentials are checked before any expensive work; a doomed
            // upload should fail before generation, not after.
            let uploader = if no_upload {
                None
            } else {
                match YouTubeUploader::from_env() {
                    Ok(u) => Some(u),
                    Err(e) => {
                        error!("[AUTO] {}", e);
                        std::process::exit(1);
                    }
                }
            };

            let llm = Arc::new(LlmClient::new(&settings.openai_api_url, &settings.openai_api_key));
            let writer = FactGenerator::new(llm);

            let mut pipeline = build_pipeline(&settings);
            let accepted = match pipeline.run(&request).await {
                Ok(a) => a,
                Err(e) => {
                    error!("[FAILED] {}", e);
                    std::process::exit(1);
                }
            };
            info!("[AUTO] generated {:?}", accepted.artifact.path);

            let Some(uploader) = uploader else {
                info!("[AUTO] upload skipped");
                return;
            };
            let metadata = match writer.metadata(&accepted.fact).await {
                Ok(m) => m,
                Err(e) => {
                    error!("[AUTO] metadata generation failed: {e:#}");
                    std::process::exit(1);
                }
            };
            match uploader.upload(&accepted.artifact.path, &metadata, &privacy).await {
                Ok(result) => info!("[AUTO] published {}", result.url),
                Err(e) => {
                    error!("[AUTO] upload failed: {e:#}");
                    std::process::exit(1);
                }
            }
        }
    }
}
