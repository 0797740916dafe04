use crate::core::executor::ExecutorConfig;
use crate::pipeline::Caller;
use crate::types::policy::DEFAULT_BATCH_SIZE;
use crate::types::{DedupePolicy, DuplicateMode, EntityType, ImportError, ImportPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::warn;

/// Import courses, events, lessons and enrollments into a catalog store
#[derive(Parser, Debug)]
#[command(name = "bulk-import")]
#[command(about = "Import and reconcile catalog records from CSV or JSON", long_about = None)]
pub struct CliArgs {
    /// Input file containing the records to import
    #[arg(value_name = "INPUT", help = "Path to the input CSV or JSON file")]
    pub input_file: PathBuf,

    #[arg(
        long = "format",
        value_name = "FORMAT",
        help = "Input format (inferred from the file extension when omitted)"
    )]
    pub format: Option<InputFormat>,

    #[arg(
        long = "type",
        value_name = "TYPE",
        help = "Entity type: course, event, lesson or enrollment (required for CSV)"
    )]
    pub entity_type: Option<EntityType>,

    #[arg(
        long = "mode",
        value_name = "MODE",
        help = "Duplicate handling: create_only, skip_duplicates, update_existing or replace_all"
    )]
    pub mode: Option<DuplicateMode>,

    #[arg(long = "confirm-replace-all", help = "Allow replace_all to delete stored entities")]
    pub confirm_replace_all: bool,

    #[arg(long = "dry-run", help = "Report what would happen without writing")]
    pub dry_run: bool,

    #[arg(long = "validate-first", help = "Attach a whole-file validation report")]
    pub validate_first: bool,

    #[arg(
        long = "dedupe",
        value_name = "POLICY",
        help = "Resolve duplicate keys inside the input: first_wins or last_wins"
    )]
    pub dedupe: Option<DedupePolicy>,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of records per chunk (default: 10)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "max-in-flight",
        value_name = "COUNT",
        help = "Maximum store operations outstanding within a chunk (default: batch size)"
    )]
    pub max_in_flight: Option<usize>,

    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "store",
        value_name = "SNAPSHOT",
        help = "JSON store snapshot to load and, unless --dry-run, save back"
    )]
    pub store: Option<PathBuf>,

    #[arg(
        long = "actor",
        value_name = "ID",
        default_value = "cli",
        help = "Caller id recorded in the audit trail"
    )]
    pub actor: String,

    #[arg(long = "role", value_name = "ROLE", default_value = "admin", help = "Caller role")]
    pub role: String,

    #[arg(
        long = "timeout-secs",
        value_name = "SECS",
        help = "Cancel the run after this many seconds; unreached records are skipped"
    )]
    pub timeout_secs: Option<u64>,

    #[arg(long = "errors-csv", value_name = "PATH", help = "Write failed records to a CSV report")]
    pub errors_csv: Option<PathBuf>,

    #[arg(
        long = "export",
        value_name = "PATH",
        help = "Write the stored entities of the imported type as a JSON envelope"
    )]
    pub export: Option<PathBuf>,

    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "info",
        help = "Log filter used when RUST_LOG is not set"
    )]
    pub log_level: String,
}

/// Supported input formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    Csv,
    Json,
}

impl CliArgs {
    /// Base policy for the run; JSON envelope options are layered on top
    pub fn to_policy(&self) -> ImportPolicy {
        ImportPolicy {
            mode: self.mode.unwrap_or_default(),
            dry_run: self.dry_run,
            validate_first: self.validate_first,
            confirm_replace_all: self.confirm_replace_all,
            dedupe: self.dedupe,
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::from_policy(&self.to_policy())
    }

    /// Worker threads for the runtime, falling back to the CPU count
    pub fn worker_threads(&self) -> usize {
        match self.workers {
            Some(0) => {
                warn!("Invalid workers (0), using CPU cores ({})", num_cpus::get());
                num_cpus::get()
            }
            Some(workers) => workers,
            None => num_cpus::get(),
        }
    }

    /// Explicit `--format`, or the one named by the file extension
    pub fn input_format(&self) -> Result<InputFormat, ImportError> {
        if let Some(format) = self.format {
            return Ok(format);
        }

        let extension = self
            .input_file
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("csv") => Ok(InputFormat::Csv),
            Some("json") => Ok(InputFormat::Json),
            _ => Err(ImportError::parse(format!(
                "cannot infer the format of '{}'; pass --format csv or --format json",
                self.input_file.display()
            ))),
        }
    }

    pub fn caller(&self) -> Caller {
        Caller::new(self.actor.clone(), self.role.clone())
    }
}
