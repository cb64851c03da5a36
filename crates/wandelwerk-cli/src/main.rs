// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wandelwerk — command-line front end.
//
// Entry point. Initialises logging, opens the data directory (artifacts, job
// history, audit log), builds the engine and runs one subcommand.

mod data_dir;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use wandelwerk_core::EngineConfig;
use wandelwerk_core::error::WandelwerkError;
use wandelwerk_core::human_errors::humanize_error;
use wandelwerk_core::options::TransformOptions;
use wandelwerk_core::types::{ArtifactHandle, FileFormat, JobStatus, OperationKind};
use wandelwerk_engine::{
    ArtifactStore, AuditLog, CapabilityRegistry, Engine, LocalArtifactStore, SqliteJobStore,
    Submission, SubmissionOutcome,
};

use data_dir::DataDir;

#[derive(Parser, Debug)]
#[command(
    name = "wandelwerk",
    version,
    about = "Convert and transform documents and images",
    arg_required_else_help = true
)]
struct Cli {
    /// Data directory for artifacts, job history and the audit log.
    #[arg(long, global = true, env = "WANDELWERK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Engine configuration file (defaults to wandelwerk.json in the data directory).
    #[arg(long, global = true, env = "WANDELWERK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the formats a source format can be turned into
    Formats {
        /// Source format or extension, e.g. docx, png, pdf
        source: String,
        /// Also list the operations available for the source
        #[arg(long)]
        operations: bool,
    },
    /// Run a transformation on one or more files
    Submit {
        /// Input files, imported into the artifact store in order
        files: Vec<PathBuf>,
        /// Submission as JSON; its inputs are artifact store handles
        #[arg(long, conflicts_with = "files")]
        json: Option<PathBuf>,
        /// Source format (inferred from the first file's extension if omitted)
        #[arg(long)]
        from: Option<String>,
        /// Target format
        #[arg(long)]
        to: Option<String>,
        /// Operation, e.g. convert, merge, crop, ocr
        #[arg(long, default_value = "convert")]
        operation: String,
        /// Operation options as a JSON object
        #[arg(long)]
        options: Option<String>,
        /// User recorded in the audit log
        #[arg(long, env = "WANDELWERK_USER")]
        owner: Option<String>,
    },
    /// Show job history from the job database
    Jobs {
        /// Only jobs in this state: pending, processing, completed, failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Show recent audit log entries
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only entries for this user
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Formats { source, operations } => {
            list_formats(&source, operations)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Submit {
            files,
            json,
            from,
            to,
            operation,
            options,
            owner,
        } => {
            let dir = DataDir::resolve(cli.data_dir).context("create data directory")?;
            let config = load_config(&dir, cli.config.as_deref())?;
            let (engine, store) = build_engine(&dir, config)?;

            let submission = match json {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("read {}", path.display()))?;
                    let mut submission = Submission::from_json(&text)?;
                    if owner.is_some() {
                        submission.owner = owner;
                    }
                    submission
                }
                None => {
                    let source = match from {
                        Some(name) => parse_format(&name)?,
                        None => infer_format(&files)?,
                    };
                    let Some(target) = to else {
                        bail!("--to is required unless --json is given");
                    };
                    let target = parse_format(&target)?;
                    let operation: OperationKind = operation.parse()?;
                    let options = match options {
                        Some(json) => TransformOptions::from_json(
                            serde_json::from_str(&json).context("--options is not valid JSON")?,
                        )?,
                        None => TransformOptions::default(),
                    };
                    let inputs = import_files(store.as_ref(), &files).await?;
                    let mut submission = Submission::new(inputs, source, target, operation)
                        .with_options(options);
                    submission.owner = owner;
                    submission
                }
            };

            let outcome = engine.submit(submission).await?;
            print_json(&outcome)?;
            Ok(match &outcome {
                SubmissionOutcome::Batch(result) if !result.all_succeeded() => ExitCode::from(2),
                _ => ExitCode::SUCCESS,
            })
        }
        Commands::Jobs { status } => {
            let dir = DataDir::resolve(cli.data_dir).context("create data directory")?;
            let jobs = SqliteJobStore::open(dir.jobs_db())?;
            match status {
                Some(status) => {
                    let status = parse_status(&status)?;
                    print_json(&jobs.jobs_with_status(status)?)?;
                }
                None => print_json(&jobs.status_counts()?)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Audit { limit, user } => {
            let dir = DataDir::resolve(cli.data_dir).context("create data directory")?;
            let log = AuditLog::open(dir.audit_db())?;
            let entries = match user {
                Some(user) => log.entries_for_user(&user)?,
                None => log.recent_entries(limit)?,
            };
            print_json(&entries)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn list_formats(source: &str, operations: bool) -> Result<()> {
    let registry = CapabilityRegistry::standard();
    let targets: Vec<&str> = registry
        .supported_targets_str(source)
        .into_iter()
        .map(|f| f.extension())
        .collect();
    if targets.is_empty() {
        println!("No conversions available from '{source}'.");
        return Ok(());
    }
    println!("{source} -> {}", targets.join(", "));
    if operations {
        let format = parse_format(source)?;
        let ops: Vec<&str> = registry
            .operations_for(format)
            .into_iter()
            .map(|op| op.as_str())
            .collect();
        println!("operations: {}", ops.join(", "));
    }
    Ok(())
}

fn load_config(dir: &DataDir, explicit: Option<&Path>) -> Result<EngineConfig> {
    match explicit {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("load config from {}", path.display())),
        None => Ok(EngineConfig::load_or_default(dir.root())),
    }
}

fn build_engine(dir: &DataDir, config: EngineConfig) -> Result<(Engine, Arc<dyn ArtifactStore>)> {
    let store: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::open(dir.artifacts())?);
    let jobs = Arc::new(SqliteJobStore::open(dir.jobs_db())?);
    let mut builder = Engine::builder(config.clone())
        .store(store.clone())
        .listener(jobs);
    if config.audit_enabled {
        builder = builder.audit_sink(Arc::new(AuditLog::open(dir.audit_db())?));
    }
    let engine = builder.build()?;
    info!(data_dir = %dir.root().display(), "Engine initialised");
    Ok((engine, store))
}

async fn import_files(store: &dyn ArtifactStore, files: &[PathBuf]) -> Result<Vec<ArtifactHandle>> {
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input");
        handles.push(store.write(bytes, name).await?);
    }
    Ok(handles)
}

fn parse_format(name: &str) -> Result<FileFormat> {
    Ok(name.parse::<FileFormat>()?)
}

fn infer_format(files: &[PathBuf]) -> Result<FileFormat> {
    let Some(first) = files.first() else {
        bail!("no input files given");
    };
    first
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(FileFormat::from_filename)
        .with_context(|| format!("cannot infer format of {}; pass --from", first.display()))
}

fn parse_status(name: &str) -> Result<JobStatus> {
    let status = match name.to_ascii_lowercase().as_str() {
        "pending" => JobStatus::Pending,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        other => bail!("unknown job status '{other}'"),
    };
    Ok(status)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}

/// Print an error for a person: plain wording for engine errors, the full
/// chain for everything else.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<WandelwerkError>() {
        Some(engine_err) => {
            let human = humanize_error(engine_err);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            eprintln!("  ({engine_err})");
        }
        None => eprintln!("error: {err:#}"),
    }
}
