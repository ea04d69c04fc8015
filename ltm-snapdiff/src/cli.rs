use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ltm_snapdiff::category::Category;
use ltm_snapdiff::export::ExportFormat;
use ltm_snapdiff::snapshot::SnapshotStatus;

#[derive(Parser, Debug)]
#[command(name = "ltm-snapdiff")]
#[command(about = "Snapshot, compare and restore F5 LTM configurations")]
pub struct Cli {
    /// Config file (defaults to $LTM_SNAPDIFF_CONFIG, then the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Snapshot database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Create, list and manage stored snapshots.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Compare two snapshots, a snapshot and live config, or two devices.
    Compare(CompareArgs),
    /// Bring devices back to a stored snapshot.
    Restore(RestoreArgs),
}

#[derive(clap::Subcommand, Debug)]
pub enum BackupCommand {
    /// Capture configurations into a new snapshot.
    Create(BackupCreateArgs),
    /// List stored snapshots, newest first.
    List(BackupListArgs),
    /// Show one snapshot.
    Show(BackupShowArgs),
    /// Delete one snapshot.
    Delete(BackupDeleteArgs),
    /// List snapshots older than the retention period.
    Expired(BackupExpiredArgs),
}

#[derive(Parser, Debug)]
pub struct BackupCreateArgs {
    /// Device configuration file, as ID=FILE. Repeatable.
    #[arg(long = "device", value_name = "ID=FILE", value_parser = parse_device_file)]
    pub devices: Vec<(String, PathBuf)>,
    /// Fetch configurations live instead of reading files.
    #[arg(long, conflicts_with = "devices")]
    pub fetch: bool,
    /// Device to fetch; every configured device when omitted. Repeatable.
    #[arg(long = "fetch-device", value_name = "ID", requires = "fetch")]
    pub fetch_devices: Vec<String>,
    /// Directory serving live configurations as <ID>.conf.
    #[arg(long)]
    pub live_dir: Option<PathBuf>,
    #[arg(long, default_value = "cli")]
    pub author: String,
    #[arg(long)]
    pub comment: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct BackupListArgs {
    /// Only snapshots containing this device.
    #[arg(long)]
    pub device: Option<String>,
    /// Created at or after (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub since: Option<String>,
    /// Created before (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub until: Option<String>,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<SnapshotStatus>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct BackupShowArgs {
    pub id: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct BackupDeleteArgs {
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct BackupExpiredArgs {
    /// Retention in days; overrides `store.retention_days`.
    #[arg(long)]
    pub days: Option<u32>,
    /// Delete the expired snapshots.
    #[arg(long)]
    pub delete: bool,
}

/// Device and object selection shared by compare and restore.
#[derive(clap::Args, Debug, Default)]
pub struct ScopeArgs {
    /// Compare only this device against itself. Repeatable.
    #[arg(long = "device", value_name = "ID")]
    pub devices: Vec<String>,
    /// Compare device SRC on the source side with TGT on the target side.
    #[arg(long = "pair", value_name = "SRC=TGT", value_parser = parse_pair)]
    pub pairs: Vec<(String, String)>,
    /// Restrict to a category. Repeatable.
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<Category>,
    /// Restrict to an object name or full path. Repeatable.
    #[arg(long = "object", value_name = "NAME")]
    pub objects: Vec<String>,
    /// Directory serving live configurations as <ID>.conf or <ID>@<VERSION>.conf.
    #[arg(long)]
    pub live_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Snapshot id, `live`, `live@VERSION` or `file:PATH[,PATH...]`.
    pub source: String,
    /// Snapshot id, `live`, `live@VERSION` or `file:PATH[,PATH...]`.
    pub target: String,
    #[command(flatten)]
    pub scope: ScopeArgs,
    #[arg(long, value_enum, default_value_t = CompareFormat::Text)]
    pub format: CompareFormat,
    /// Only print change counts and impact flags.
    #[arg(long)]
    pub summary: bool,
    /// Fail when the changes carry security impact or critical findings.
    #[arg(long)]
    pub strict: bool,
    /// Write the report to a file instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Stored snapshot holding the desired configuration.
    pub source: String,
    /// Current state to restore over.
    #[arg(default_value = "live")]
    pub target: String,
    #[command(flatten)]
    pub scope: ScopeArgs,
    /// Preview the restore without applying it.
    #[arg(long)]
    pub dry_run: bool,
    /// Write merge and delete files per device into this directory.
    #[arg(long, required_unless_present = "dry_run")]
    pub apply_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum CompareFormat {
    Text,
    Json,
    Html,
    Csv,
}

impl From<CompareFormat> for ExportFormat {
    fn from(format: CompareFormat) -> Self {
        match format {
            CompareFormat::Text => ExportFormat::Text,
            CompareFormat::Json => ExportFormat::Json,
            CompareFormat::Html => ExportFormat::Html,
            CompareFormat::Csv => ExportFormat::Csv,
        }
    }
}

fn parse_device_file(raw: &str) -> Result<(String, PathBuf), String> {
    let (id, path) = split_assignment(raw, "ID=FILE")?;
    Ok((id, PathBuf::from(path)))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    split_assignment(raw, "SRC=TGT")
}

fn split_assignment(raw: &str, shape: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.trim().to_string(), right.trim().to_string()))
        }
        _ => Err(format!("expected {shape}, got '{raw}'")),
    }
}

fn parse_status(raw: &str) -> Result<SnapshotStatus, String> {
    SnapshotStatus::parse(raw).ok_or_else(|| format!("unknown status '{raw}'"))
}
