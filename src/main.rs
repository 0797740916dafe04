//! Bulk Import CLI
//!
//! Command-line interface for importing catalog records from CSV or JSON files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --type course courses.csv --store store.json
//! cargo run -- lessons.json --store store.json --mode update_existing
//! cargo run -- --type enrollment enrollments.csv --store store.json --dry-run
//! cargo run -- --type course courses.csv --store store.json \
//!     --mode replace_all --confirm-replace-all
//! ```
//!
//! The program loads the store snapshot, parses the input file, runs it through
//! the import pipeline and prints the outcome as JSON on stdout. Logs go to
//! stderr. Unless the run is a dry run, the snapshot is saved back afterwards.
//!
//! # Exit Codes
//!
//! - 0: Every record was applied, skipped or previewed
//! - 1: Run-level error (unreadable input, policy violation, authorization)
//! - 2: The run finished but some records failed

use bulk_import::cli::{self, CliArgs, InputFormat};
use bulk_import::core::{MemoryStore, ProgressTracker, TracingAuditSink};
use bulk_import::io::{write_failures_csv, AsyncCsvReader};
use bulk_import::pipeline::{export_envelope, ImportPipeline, ImportRequest};
use bulk_import::types::{ImportError, ImportOutcome};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let args = cli::parse_args();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let code = runtime.block_on(async {
        match import(&args).await {
            Ok(outcome) => {
                print_json(&outcome);
                if outcome.success {
                    0
                } else {
                    2
                }
            }
            Err(e) => {
                error!(error = %e, "Import failed");
                print_json(&json!({ "success": false, "error": e.to_string() }));
                1
            }
        }
    });

    process::exit(code);
}

async fn import(args: &CliArgs) -> Result<ImportOutcome, ImportError> {
    let store = Arc::new(match &args.store {
        Some(path) => MemoryStore::load(path).await?,
        None => MemoryStore::new(),
    });

    let request = read_request(args).await?;
    let entity_type = request.entity_type;

    let pipeline = ImportPipeline::new(store.clone(), Arc::new(TracingAuditSink), args.to_policy());

    let timeout = args.timeout_secs.map(|secs| {
        let token = pipeline.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "Timeout reached, cancelling import");
            token.cancel();
        })
    });

    let plan = pipeline.plan(Some(&args.caller()), request).await?;
    let dry_run = plan.policy.dry_run;

    let progress = ProgressTracker::new(plan.total());
    let mut updates = progress.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = *updates.borrow_and_update();
            debug!(
                processed = snapshot.processed,
                total = snapshot.total,
                percentage = snapshot.percentage,
                "Progress"
            );
        }
    });

    let outcome = pipeline.execute_with_progress(plan, &progress).await;

    drop(progress);
    if let Err(e) = reporter.await {
        warn!(error = %e, "Progress reporter did not complete");
    }
    if let Some(timeout) = timeout {
        timeout.abort();
    }

    if let Some(path) = &args.errors_csv {
        let mut file = std::fs::File::create(path)?;
        write_failures_csv(&outcome, &mut file)?;
        info!(path = %path.display(), failed = outcome.failed.len(), "Wrote failure report");
    }

    if let Some(path) = &args.store {
        if dry_run {
            debug!("Dry run, store snapshot left untouched");
        } else {
            store.save(path).await?;
            info!(path = %path.display(), "Saved store snapshot");
        }
    }

    if let Some(path) = &args.export {
        let envelope = export_envelope(store.as_ref(), entity_type)
            .await
            .map_err(|e| ImportError::Io {
                message: e.to_string(),
            })?;
        write_json(path, &envelope)?;
        info!(path = %path.display(), "Exported entities");
    }

    Ok(outcome)
}

async fn read_request(args: &CliArgs) -> Result<ImportRequest, ImportError> {
    let path = &args.input_file;
    match args.input_format()? {
        InputFormat::Json => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| open_failed(path, e))?;
            let request = ImportRequest::from_json(&text)?;
            if let Some(declared) = args.entity_type {
                if declared != request.entity_type {
                    warn!(
                        declared = %declared,
                        envelope = %request.entity_type,
                        "--type differs from the envelope type, using the envelope"
                    );
                }
            }
            Ok(request)
        }
        InputFormat::Csv => {
            let entity_type = args
                .entity_type
                .ok_or_else(|| ImportError::parse("--type is required for CSV input"))?;

            let file = tokio::fs::File::open(path).await.map_err(|e| open_failed(path, e))?;

            // Wrap tokio file in a compatibility layer for csv-async
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncCsvReader::open(compat_file, entity_type).await?;

            let records = reader.read_all(args.to_executor_config().batch_size).await;
            info!(path = %path.display(), records = records.len(), "Read CSV input");
            Ok(ImportRequest::new(entity_type, records))
        }
    }
}

fn open_failed(path: &Path, error: std::io::Error) -> ImportError {
    ImportError::Io {
        message: format!("Failed to open file '{}': {}", path.display(), error),
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), ImportError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ImportError::Serialization {
        message: e.to_string(),
    })?;
    std::fs::write(path, text)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to encode outcome: {}", e),
    }
}
