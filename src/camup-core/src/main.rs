//! Camup - camera uploads tracker CLI
//!
//! Scans camera folders, keeps the upload record ledger in SQLite and pushes
//! pending files to an upload target.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};

use camup_core::cipher::FieldCipher;
use camup_core::colored_logger::{init_component_logger, Component};
use camup_core::config::Config;
use camup_core::fingerprint::Blake3Fingerprinter;
use camup_core::mapper::RecordMapper;
use camup_core::media::DirectoryMediaIndex;
use camup_core::reconciler::Reconciler;
use camup_core::repository::RecordRepository;
use camup_core::transport::LocalFolderTransport;
use camup_db::{
    CameraUploadFolderType, CameraUploadsRecord, CameraUploadsRecordType, Database, RecordKey,
    RecordStore, UploadStatus,
};

#[derive(Parser)]
#[command(name = "camup")]
#[command(about = "Camera uploads record tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the database and temp files
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile camera folders against the record store
    Scan {
        /// Keep scanning on the configured interval until Ctrl+C
        #[arg(short, long)]
        watch: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload pending records to the configured target directory
    Upload,

    /// Show record counts per folder and status
    Status,

    /// List records matching all filters (an omitted filter matches everything)
    List {
        /// Upload statuses, comma separated
        #[arg(short, long, value_delimiter = ',')]
        status: Vec<UploadStatus>,

        /// File types (photo, video), comma separated
        #[arg(short = 't', long, value_delimiter = ',')]
        file_type: Vec<CameraUploadsRecordType>,

        /// Folder types (primary, secondary), comma separated
        #[arg(short, long, value_delimiter = ',')]
        folder_type: Vec<CameraUploadFolderType>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every record as JSON
    Dump,

    /// Set the upload status of one record
    Mark {
        media_id: i64,
        timestamp: i64,
        folder_type: CameraUploadFolderType,
        status: UploadStatus,
    },

    /// Delete all records of the given folder types
    Reset {
        #[arg(required = true)]
        folder_types: Vec<CameraUploadFolderType>,
    },

    /// Generate a new encryption key for the config file
    Keygen,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let component = match cli.command {
        Commands::Scan { .. } => Component::Scan,
        Commands::Upload => Component::Upload,
        Commands::Keygen => Component::Main,
        _ => Component::Store,
    };
    init_component_logger(component, level)?;

    let config = load_config(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Scan { watch, json } => {
            if watch {
                cmd_watch(config)?;
            } else {
                cmd_scan(config, json)?;
            }
        }
        Commands::Upload => {
            cmd_upload(config)?;
        }
        Commands::Status => {
            cmd_status(&config)?;
        }
        Commands::List { status, file_type, folder_type, json } => {
            cmd_list(&config, status, file_type, folder_type, json)?;
        }
        Commands::Dump => {
            cmd_dump(&config)?;
        }
        Commands::Mark { media_id, timestamp, folder_type, status } => {
            cmd_mark(&config, RecordKey::new(media_id, timestamp, folder_type), status)?;
        }
        Commands::Reset { folder_types } => {
            cmd_reset(&config, &folder_types)?;
        }
        Commands::Keygen => {
            println!("{}", FieldCipher::generate_key());
        }
    }

    Ok(())
}

/// Load the explicit config file, else the default one if present, else defaults
fn load_config(path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(&path)?,
        None => {
            let default_path = Config::default_path();
            if default_path.exists() {
                Config::from_file(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(dir) = data_dir {
        config.general.data_dir = Some(dir.to_string_lossy().into_owned());
    }

    Ok(config)
}

fn open_repository(config: &Config) -> Result<RecordRepository> {
    let db_path = config.database_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {:?}", db_path))?;
    Ok(RecordRepository::new(RecordStore::new(db), config.cipher()?))
}

fn build_reconciler(config: Config) -> Result<Reconciler> {
    let repo = open_repository(&config)?;
    let mapper = RecordMapper::new(Arc::new(Blake3Fingerprinter));
    Ok(Reconciler::new(repo, Arc::new(DirectoryMediaIndex), mapper, config))
}

fn cmd_scan(config: Config, json: bool) -> Result<()> {
    let reconciler = build_reconciler(config)?;
    let summary = reconciler.reconcile_once()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("discovered:      {}", summary.discovered);
        println!("new records:     {}", summary.inserted);
        println!("already tracked: {}", summary.already_tracked);
        println!("skipped:         {}", summary.skipped);
        println!("missing locally: {}", summary.missing);
        println!("removed:         {}", summary.removed);
    }

    Ok(())
}

#[tokio::main]
async fn cmd_watch(config: Config) -> Result<()> {
    info!("data directory: {:?}", config.resolve_data_dir());
    let reconciler = build_reconciler(config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        warn!("received shutdown signal, stopping scanner...");
        r.store(false, Ordering::Relaxed);
    })?;

    reconciler.run(running).await
}

fn cmd_upload(config: Config) -> Result<()> {
    let target = config
        .upload_target()
        .context("no upload target configured, set [upload] target_dir")?;
    std::fs::create_dir_all(config.temp_dir())?;

    info!("uploading to {:?}", target);
    let transport = LocalFolderTransport::new(target, Arc::new(Blake3Fingerprinter));
    let reconciler = build_reconciler(config)?;
    let summary = reconciler.upload_pending(&transport)?;

    println!("uploaded:        {}", summary.uploaded);
    println!("failed:          {}", summary.failed);
    println!("missing locally: {}", summary.missing);

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let db_path = config.database_path();
    if !db_path.exists() {
        println!("status: not initialized");
        println!("database: not found at {:?}", db_path);
        return Ok(());
    }

    let repo = open_repository(config)?;
    let counts = repo.count_by_status()?;

    println!("database: {:?}", db_path);
    for folder_type in CameraUploadFolderType::ALL {
        let enabled = if config.folder(folder_type).enabled { "enabled" } else { "disabled" };
        println!("\n{} ({})", folder_type, enabled);
        let mut total = 0;
        for status in UploadStatus::ALL {
            let count = counts.get(&(folder_type, status)).copied().unwrap_or(0);
            total += count;
            println!("  {:<22} {}", status.as_code().to_lowercase(), count);
        }
        println!("  {:<22} {}", "total", total);
    }

    Ok(())
}

fn cmd_list(
    config: &Config,
    statuses: Vec<UploadStatus>,
    file_types: Vec<CameraUploadsRecordType>,
    folder_types: Vec<CameraUploadFolderType>,
    json: bool,
) -> Result<()> {
    let statuses = or_all(statuses, &UploadStatus::ALL);
    let file_types = or_all(file_types, &CameraUploadsRecordType::ALL);
    let folder_types = or_all(folder_types, &CameraUploadFolderType::ALL);

    let repo = open_repository(config)?;
    let records = repo.get_records(&statuses, &file_types, &folder_types)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("no matching records");
        return Ok(());
    }

    println!("found {} record(s):\n", records.len());
    for record in &records {
        print_record(record);
    }

    Ok(())
}

/// An omitted CLI filter means every value
fn or_all<T: Copy>(given: Vec<T>, all: &[T]) -> Vec<T> {
    if given.is_empty() {
        all.to_vec()
    } else {
        given
    }
}

fn print_record(record: &CameraUploadsRecord) {
    let taken = DateTime::<Utc>::from_timestamp_millis(record.timestamp)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| record.timestamp.to_string());

    println!("{} {}", record.key(), record.file_name);
    println!("   {} {} {} bytes", record.file_type, record.upload_status, record.file_size);
    println!("   modified: {}", taken);
    println!("   path: {}", record.file_path);
}

fn cmd_dump(config: &Config) -> Result<()> {
    let repo = open_repository(config)?;
    let records = repo.get_all_records()?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn cmd_mark(config: &Config, key: RecordKey, status: UploadStatus) -> Result<()> {
    let repo = open_repository(config)?;
    if repo.update_upload_status(&key, status)? {
        println!("{} -> {}", key, status);
    } else {
        println!("no record {}", key);
    }
    Ok(())
}

fn cmd_reset(config: &Config, folder_types: &[CameraUploadFolderType]) -> Result<()> {
    let repo = open_repository(config)?;
    let deleted = repo.delete_records_by_folder_type(folder_types)?;
    println!("deleted {} record(s)", deleted);
    Ok(())
}
