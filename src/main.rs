use anyhow::{Context, Result};
use bilingual_reel::config::TitleCard;
use bilingual_reel::image_norm::normalize_in_place;
use bilingual_reel::{LocalInputs, Pipeline, Settings};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bilingual-reel", version, about = "Render narrated vertical videos with bilingual subtitles from a spreadsheet of texts")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Transcription model
    #[arg(long, global = true)]
    whisper_model: Option<String>,

    /// Language of the narration, passed to transcription
    #[arg(long, global = true)]
    language: Option<String>,

    /// Text for a short closing title card (default: TITLE_CARD_TEXT)
    #[arg(long, global = true)]
    title_card: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Produce and upload the video for a session (first unprocessed row if omitted)
    Run {
        session_id: Option<String>,

        /// Use a random sample of this many images
        #[arg(long)]
        images: Option<usize>,

        /// Also copy the final video here
        #[arg(long)]
        keep_output: Option<PathBuf>,
    },

    /// List rows that still need a video
    Scan,

    /// Render from local files without the spreadsheet or drive
    Render {
        /// Narration text file
        #[arg(long)]
        primary: PathBuf,

        /// Second-language subtitle text file
        #[arg(long)]
        secondary: PathBuf,

        /// Directory of background images
        #[arg(long)]
        images: PathBuf,

        /// Background music file
        #[arg(long)]
        music: PathBuf,

        /// Output MP4 file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Letterbox images in place to the output frame size
    Normalize {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level.into())
        .parse_default_env()
        .init();

    let mut settings = Settings::from_env();
    if let Some(model) = args.whisper_model {
        settings.transcription.model = model;
    }
    if let Some(language) = args.language {
        settings.transcription.language = language;
    }
    if let Some(text) = args.title_card {
        settings.title_card = Some(TitleCard::new(text));
    }

    match args.command {
        Commands::Run {
            session_id,
            images,
            keep_output,
        } => {
            settings.image_sample = images;
            let pipeline = Pipeline::new(settings).with_progress(spinner());

            let session_id = match session_id {
                Some(id) => id,
                None => {
                    log::info!("No session given; scanning for unprocessed rows");
                    let pending = pipeline.scan().await.context("Scan spreadsheet")?;
                    match pending.into_iter().next() {
                        Some(row) => {
                            log::info!("Processing row {}: {}", row.row_number, row.session_id);
                            row.session_id
                        }
                        None => {
                            log::info!("Nothing to process");
                            return Ok(());
                        }
                    }
                }
            };

            let report = pipeline
                .run(&session_id, keep_output.as_deref())
                .await
                .with_context(|| format!("Session {session_id} failed"))?;
            pipeline.finish(format!(
                "Done. Session {} (row {}): video {} ({:.1}s)",
                report.session_id, report.row_number, report.video_id, report.duration
            ));
        }
        Commands::Scan => {
            let pipeline = Pipeline::new(settings);
            let pending = pipeline.scan().await.context("Scan spreadsheet")?;
            if pending.is_empty() {
                println!("No unprocessed rows");
            }
            for row in pending {
                println!("row {}\t{}", row.row_number, row.session_id);
            }
        }
        Commands::Render {
            primary,
            secondary,
            images,
            music,
            output,
        } => {
            let inputs = LocalInputs {
                primary_text: primary,
                secondary_text: secondary,
                images_dir: images,
                music,
                output,
            };
            let pipeline = Pipeline::new(settings).with_progress(spinner());
            let duration = pipeline
                .render_local(&inputs)
                .await
                .context("Local render failed")?;
            pipeline.finish(format!(
                "Done. Video: {} ({:.1}s)",
                inputs.output.display(),
                duration
            ));
        }
        Commands::Normalize { images } => {
            let canvas = settings.layout.canvas;
            for image in &images {
                normalize_in_place(image, canvas.width, canvas.height)
                    .with_context(|| format!("Normalize {}", image.display()))?;
                println!("{} ({}x{})", image.display(), canvas.width, canvas.height);
            }
        }
    }

    Ok(())
}

fn spinner() -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        progress.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}
