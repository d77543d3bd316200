use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use photo_upload::{present, HttpTransport, OwnerContext};

mod database;
mod error;
mod models;
mod services;

use error::AppError;
use services::{upload_service, SqliteResultSink};

#[derive(Parser)]
#[command(name = "listing-photos", version, about = "Upload and record listing photos")]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, default_value = "listing-photos.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload photos and record the final ordered set
    Upload {
        /// Owner the photos are recorded for
        #[arg(long)]
        owner: String,
        /// Listing or profile record the photos belong to
        #[arg(long)]
        record: Option<String>,
        /// Position of the cover photo among the accepted files
        #[arg(long)]
        cover: Option<usize>,
        /// How often retryable failures are retried after the batch settles
        #[arg(long, default_value_t = 0)]
        retry_rounds: u32,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the recorded photos of an owner
    List {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        record: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let settings = services::load_settings(&cli.config)?;
    let conn = database::open_database(&settings.database.path)?;
    let sink = Arc::new(SqliteResultSink::new(conn));

    match cli.command {
        Command::Upload {
            owner,
            record,
            cover,
            retry_rounds,
            files,
        } => {
            let owner = OwnerContext::new(owner, record);
            let files = upload_service::load_source_files(&files)?;
            let transport = Arc::new(HttpTransport::new(settings.media_host)?);
            let manager = upload_service::build_manager(
                settings.pipeline,
                transport,
                sink.clone(),
                owner.clone(),
            )?;

            let last = Mutex::new((0usize, 0usize, 0u8));
            let _progress = manager.subscribe(move |items| {
                let view = present(items);
                let current = (view.completed, view.failed, view.overall_percent);
                let mut last = last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if *last != current {
                    *last = current;
                    log::info!(
                        "{}/{} uploaded, {} failed, {}%",
                        view.completed,
                        view.total,
                        view.failed,
                        view.overall_percent
                    );
                }
            });

            let outcome =
                upload_service::upload_batch(&manager, files, cover, retry_rounds).await?;
            for item in present(&outcome.summary.items).items {
                if let Some(message) = item.message {
                    log::warn!("{}: {}", item.file_name, message);
                }
            }
            let recorded = sink.record_final_set(&owner, &outcome.final_images)?;
            log::info!("Recorded {} photos for {}", recorded, owner.owner_id);

            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::List { owner, record } => {
            let photos = sink.list(&owner, record.as_deref())?;
            if photos.is_empty() {
                return Err(AppError::NotFound(format!("Photos for {}", owner)));
            }
            println!("{}", serde_json::to_string_pretty(&photos)?);
        }
    }

    Ok(())
}
