use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use curator::config::{load_config, EngineConfig};
use curator::db::job_repo::JobFilter;
use curator::db::Database;
use curator::logging::init_logging;
use curator::model::PreservationMetadataKind;
use curator::{
    Engine, FilesystemStorage, InMemoryRepository, JobRequest, JobState, JobStore, ObjectSource,
    PluginRegistry, ProgressKind, Result, Services,
};

#[derive(Parser)]
#[command(name = "curator", version, about = "Preservation-action orchestration engine")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered plugins and their parameters
    Plugins,
    /// Run a plugin over the contents of a transfer folder
    Run {
        #[arg(long)]
        plugin: String,
        #[arg(long)]
        transfer_dir: PathBuf,
        /// Plugin parameter as key=value, repeatable
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        #[arg(long)]
        owner: Option<String>,
        /// Write the PREMIS documents the run produced to this directory
        #[arg(long)]
        premis_out: Option<PathBuf>,
    },
    /// List persisted jobs, newest first
    Jobs {
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        plugin: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Print the report of a job
    Report { job_id: String },
}

fn parse_key_val(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Plugins => list_plugins(),
        Command::Run {
            plugin,
            transfer_dir,
            params,
            owner,
            premis_out,
        } => run(
            &config,
            plugin,
            &transfer_dir,
            params,
            owner,
            premis_out.as_deref(),
        ),
        Command::Jobs {
            state,
            plugin,
            limit,
        } => list_jobs(&config, state, plugin, limit),
        Command::Report { job_id } => print_report(&config, &job_id),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_plugins() -> Result<ExitCode> {
    let registry = PluginRegistry::with_builtins();
    for descriptor in registry.descriptors() {
        let kinds: Vec<String> = descriptor
            .object_kinds
            .iter()
            .map(|k| k.to_string())
            .collect();
        println!(
            "{} {} - {} [{}]",
            descriptor.id,
            descriptor.version,
            descriptor.name,
            kinds.join(", ")
        );

        let plugin = registry.create(descriptor.id)?;
        for param in plugin.parameters().iter() {
            println!(
                "    {:<24} default={:<10} {}{}",
                param.id,
                param.default.unwrap_or("-"),
                if param.mandatory { "(mandatory) " } else { "" },
                param.description
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(
    config: &EngineConfig,
    plugin_id: String,
    transfer_dir: &Path,
    params: Vec<(String, String)>,
    owner: Option<String>,
    premis_out: Option<&Path>,
) -> Result<ExitCode> {
    let repository = Arc::new(InMemoryRepository::new());
    let services = Services::new(
        repository.clone(),
        repository.clone(),
        Arc::new(FilesystemStorage::new(transfer_dir)),
    );
    let engine = Arc::new(Engine::from_config(config, services)?);

    let mut request = JobRequest::new(
        plugin_id,
        ObjectSource::TransferFolder {
            path: transfer_dir.to_path_buf(),
        },
    );
    request.parameters.extend(params);
    request.owner = owner;

    let mut events = engine.subscribe();
    let job_id = engine.submit(request)?;
    println!("Job {}", job_id);

    let handler_engine = Arc::clone(&engine);
    let handler_job = job_id.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_engine.cancel(&handler_job) {
            eprintln!("Cancelling, waiting for dispatched blocks...");
        }
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let watched = job_id.clone();
    let progress = thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) if event.job_id != watched => {}
            Ok(event) => {
                let stats = event.stats;
                println!(
                    "[{:>3}%] {}: {} ({} succeeded, {} failed, {} waiting)",
                    stats.completion_percentage,
                    event.kind,
                    event.message,
                    stats.succeeded,
                    stats.failed,
                    stats.waiting
                );
                if event.kind == ProgressKind::Finished {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Progress display skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    });

    let job = engine.wait(&job_id);
    if progress.join().is_err() {
        warn!("Progress display thread panicked");
    }

    let Some(job) = job else {
        eprintln!("Job {} disappeared", job_id);
        return Ok(ExitCode::FAILURE);
    };

    println!(
        "{}: {} of {} succeeded, {} failed",
        job.state, job.stats.succeeded, job.stats.total, job.stats.failed
    );
    if let Some(reason) = &job.error {
        println!("  {}", reason);
    }

    if let Some(dir) = premis_out {
        let written = export_premis(&repository, dir)?;
        info!("Wrote {} PREMIS documents", written);
        println!("{} PREMIS documents written", written);
    }

    Ok(match job.state {
        JobState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// Writes every preservation metadata record as `<dir>/<kind>/<id>.xml`.
fn export_premis(repository: &InMemoryRepository, dir: &Path) -> Result<usize> {
    let mut written = 0;
    for kind in [
        PreservationMetadataKind::Agent,
        PreservationMetadataKind::Event,
        PreservationMetadataKind::ObjectFile,
        PreservationMetadataKind::ObjectRepresentation,
    ] {
        let records = repository.preservation_metadata(kind);
        if records.is_empty() {
            continue;
        }
        let kind_dir = dir.join(kind.as_str());
        std::fs::create_dir_all(&kind_dir).map_err(|e| {
            curator::StorageError::CreateDirectory {
                path: kind_dir.clone(),
                source: e,
            }
        })?;
        for record in records {
            let path = kind_dir.join(format!("{}.xml", record.id.replace('/', "_")));
            std::fs::write(&path, &record.payload).map_err(|e| {
                curator::StorageError::WriteFile {
                    path: path.clone(),
                    source: e,
                }
            })?;
            written += 1;
        }
    }
    Ok(written)
}

fn open_store(config: &EngineConfig) -> Result<JobStore> {
    match config.database_path() {
        Some(path) => Ok(JobStore::with_database(Database::open(&path)?)),
        None => Ok(JobStore::new()),
    }
}

fn list_jobs(
    config: &EngineConfig,
    state: Option<String>,
    plugin_id: Option<String>,
    limit: u64,
) -> Result<ExitCode> {
    if let Some(state) = &state {
        if JobState::parse(state).is_none() {
            eprintln!("Unknown job state '{}'", state);
            return Ok(ExitCode::FAILURE);
        }
    }

    let store = open_store(config)?;
    let jobs = store.list(&JobFilter {
        state,
        plugin_id,
        limit: Some(limit),
        offset: None,
    })?;

    if jobs.is_empty() {
        println!("No jobs");
    }
    for job in jobs {
        println!(
            "{}  {:<22} {:<32} {:>3}%  {}/{} ok  {}",
            job.id,
            job.state,
            job.plugin_id,
            job.stats.completion_percentage,
            job.stats.succeeded,
            job.stats.total,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(config: &EngineConfig, job_id: &str) -> Result<ExitCode> {
    let store = open_store(config)?;
    let Some(job) = store.get(job_id) else {
        eprintln!("No job {}", job_id);
        return Ok(ExitCode::FAILURE);
    };

    println!(
        "{} {} {} ({} of {} succeeded)",
        job.id, job.plugin_id, job.state, job.stats.succeeded, job.stats.total
    );
    for item in store.report(job_id)?.items {
        println!(
            "  [{}] {} {} {}",
            item.block_id.map_or("-".to_string(), |b| b.to_string()),
            item.state,
            item.object_id,
            item.details
        );
    }
    Ok(ExitCode::SUCCESS)
}
