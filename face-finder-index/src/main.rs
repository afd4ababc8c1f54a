use clap::{Parser, Subcommand};
use face_finder_embed::{CommandProvider, DetectionModel, FaceEmbeddingProvider};
use face_finder_index::config::{
    DEFAULT_TOLERANCE, FileSettings, IndexingConfig, SearchConfig, check_tolerance,
    default_workers,
};
use face_finder_index::retrieval::{indexing_engine::IndexingEngine, matcher::FaceMatcher};
use face_finder_index::status::{StatusEvent, StatusReceiver, status_channel};
use face_finder_index::storage::{FaceStore, sqlite_store::SqliteFaceStore};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Index the faces in a photo collection and find every photo of a person.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Face index database file (default: photo_face_index.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Settings file (default: ./face-finder.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "summary")]
    format: OutputFormat,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the face index database, or check an existing one
    Init,
    /// Scan directories and index new or modified photos
    Index {
        /// Directories to scan recursively
        #[arg(required = true)]
        directories: Vec<PathBuf>,
        /// Number of parallel workers (default: number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Reprocess every photo, even if unchanged
        #[arg(long)]
        force_rescan: bool,
        /// Face detection model: hog (fast) or cnn (accurate)
        #[arg(long)]
        detection_model: Option<DetectionModel>,
        /// Also scan HEIC/HEIF photos
        #[arg(long)]
        extended_formats: bool,
    },
    /// Find indexed photos containing the face in a reference image
    Search {
        /// Photo of the person to look for
        reference: PathBuf,
        /// Maximum face distance counted as a match, strictly between 0 and 1 (default: 0.6)
        #[arg(short, long)]
        tolerance: Option<f64>,
        /// Face detection model used on the reference image
        #[arg(long)]
        detection_model: Option<DetectionModel>,
    },
    /// Show database statistics
    Stats,
    /// List indexed photos
    List {
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct ListedFile {
    file_path: PathBuf,
    face_count: usize,
    last_modified: f64,
    modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = FileSettings::load(args.config.as_deref())?;
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| settings.database_or_default());

    match args.command {
        Commands::Init => {
            let store = SqliteFaceStore::open(&db_path).await?;
            let stats = store.stats().await?;
            store.close().await;
            println!("Initialized face index at {}", db_path.display());
            println!(
                "Faces: {} in {} files",
                stats.face_rows, stats.files_with_faces
            );
            Ok(())
        }
        Commands::Index {
            directories,
            workers,
            force_rescan,
            detection_model,
            extended_formats,
        } => {
            let provider = build_provider(&settings)?;
            let config = IndexingConfig::new(db_path, directories)
                .with_max_workers(workers.or(settings.workers).unwrap_or_else(default_workers))
                .with_force_rescan(force_rescan)
                .with_detection_model(
                    detection_model
                        .or(settings.detection_model)
                        .unwrap_or_default(),
                )
                .with_extended_formats(extended_formats);

            let (status, events) = status_channel();
            let printer = tokio::spawn(print_events(events, args.format));
            let result = IndexingEngine::new(config, provider, status).run().await;
            if let Err(e) = printer.await {
                tracing::warn!("Status printer failed: {}", e);
            }

            let summary = result?;
            if args.format == OutputFormat::Json {
                println!("{}", serde_json::to_string(&summary)?);
            }
            Ok(())
        }
        Commands::Search {
            reference,
            tolerance,
            detection_model,
        } => {
            let tolerance = check_tolerance(
                tolerance
                    .or(settings.tolerance)
                    .unwrap_or(DEFAULT_TOLERANCE),
            )?;
            let provider = build_provider(&settings)?;
            let config = SearchConfig::new(db_path, reference)
                .with_tolerance(tolerance)
                .with_detection_model(
                    detection_model
                        .or(settings.detection_model)
                        .unwrap_or_default(),
                );

            let (status, events) = status_channel();
            let printer = tokio::spawn(print_events(events, args.format));
            let result = FaceMatcher::new(config, provider, status).run().await;
            if let Err(e) = printer.await {
                tracing::warn!("Status printer failed: {}", e);
            }

            let outcome = result?;
            if args.format == OutputFormat::Json {
                println!("{}", serde_json::to_string(&outcome)?);
            }
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteFaceStore::open_existing(&db_path).await?;
            let stats = store.stats().await?;
            store.close().await;

            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Database: {}", db_path.display());
                    println!("Face records: {}", stats.face_rows);
                    println!("Files with faces: {}", stats.files_with_faces);
                    println!("Files without faces: {}", stats.files_without_faces);
                }
            }
            Ok(())
        }
        Commands::List { limit } => {
            let store = SqliteFaceStore::open_existing(&db_path).await?;
            let files = store.list_files(limit).await?;
            store.close().await;

            let listed: Vec<ListedFile> = files
                .into_iter()
                .map(|f| ListedFile {
                    modified_at: to_datetime(f.last_modified),
                    file_path: f.file_path,
                    face_count: f.face_count,
                    last_modified: f.last_modified,
                })
                .collect();

            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listed)?),
                OutputFormat::Summary => {
                    println!("Found {} files:", listed.len());
                    for file in listed {
                        let modified = file
                            .modified_at
                            .map(|t| {
                                t.with_timezone(&chrono::Local)
                                    .format("%Y-%m-%d %H:%M:%S")
                                    .to_string()
                            })
                            .unwrap_or_else(|| "unknown".to_string());
                        println!(
                            "  {} | Faces: {} | Modified: {}",
                            file.file_path.display(),
                            file.face_count,
                            modified
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn build_provider(settings: &FileSettings) -> anyhow::Result<Arc<dyn FaceEmbeddingProvider>> {
    let provider = CommandProvider::new(settings.provider_or_default())?;
    tracing::debug!("Using provider {}", provider.provider_name());
    Ok(Arc::new(provider))
}

/// Seconds since the epoch as a UTC timestamp
fn to_datetime(secs: f64) -> Option<chrono::DateTime<chrono::Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    chrono::DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Render status events until the run drops its sender.
async fn print_events(events: StatusReceiver, format: OutputFormat) {
    while let Some(event) = events.recv().await {
        match format {
            OutputFormat::Json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Cannot serialize status event: {}", e),
            },
            OutputFormat::Summary => match &event {
                StatusEvent::Warning { .. }
                | StatusEvent::Error { .. }
                | StatusEvent::Fatal { .. }
                | StatusEvent::Aborted { .. } => eprintln!("{event}"),
                StatusEvent::Info { message } => println!("{message}"),
                _ => println!("{event}"),
            },
        }
    }
}
