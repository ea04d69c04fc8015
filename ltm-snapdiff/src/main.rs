use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ltm_snapdiff::compare::{CompareScope, DevicePair, SnapshotRef};
use ltm_snapdiff::config::{resolve_config, AppConfig};
use ltm_snapdiff::diff::DiffScope;
use ltm_snapdiff::engine::Engine;
use ltm_snapdiff::fetch::DirectoryFetcher;
use ltm_snapdiff::logging::{self, LogFormat};
use ltm_snapdiff::snapshot::RawConfig;
use ltm_snapdiff::store::{default_store_path, SqliteStore};
use tracing::debug;

mod backup_cmd;
mod cli;
mod compare_cmd;
mod path_guard;
mod restore_cmd;

use cli::{Cli, Command, ScopeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(log_format, cli.verbose);

    let (config, config_source) = resolve_config(cli.config.as_deref())?;
    debug!(source = %config_source, "configuration loaded");
    let session = Session {
        config,
        db: cli.db,
    };

    match cli.command {
        Command::Backup(command) => backup_cmd::run_backup(&session, command).await,
        Command::Compare(args) => compare_cmd::run_compare(&session, args).await,
        Command::Restore(args) => restore_cmd::run_restore(&session, args).await,
    }
}

/// Settings shared by every subcommand.
pub struct Session {
    pub config: AppConfig,
    pub db: Option<PathBuf>,
}

impl Session {
    fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = self.db.clone().or_else(|| self.config.store.path.clone()) {
            return Ok(path);
        }
        Ok(default_store_path()?)
    }

    /// Engine over the snapshot database, reading live configurations from
    /// `live_dir` (or `fetch.directory`) when one is given.
    pub fn engine(&self, live_dir: Option<&Path>) -> Result<Engine> {
        let path = self.store_path()?;
        let store = SqliteStore::open(&path)
            .with_context(|| format!("failed to open snapshot store {}", path.display()))?;
        let mut engine = Engine::from_config(Arc::new(store), &self.config);
        let live_dir = live_dir
            .map(Path::to_path_buf)
            .or_else(|| self.config.fetch.directory.clone());
        if let Some(dir) = live_dir {
            engine = engine.with_fetcher(Arc::new(DirectoryFetcher::new(dir)));
        }
        Ok(engine)
    }

    pub fn output_inputs(&self) -> Vec<PathBuf> {
        self.db.iter().cloned().collect()
    }
}

/// Resolve a command-line side: a snapshot id, `live`, `live@VERSION` or
/// `file:PATH[,PATH...]`.
pub fn parse_side(engine: &Engine, raw: &str) -> Result<SnapshotRef> {
    if raw == "live" {
        return Ok(SnapshotRef::Live);
    }
    if let Some(version) = raw.strip_prefix("live@") {
        if version.is_empty() {
            bail!("missing version in '{raw}'");
        }
        return Ok(SnapshotRef::Version(version.to_string()));
    }
    if let Some(paths) = raw.strip_prefix("file:") {
        let configs = paths
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| read_device_file(Path::new(p)))
            .collect::<Result<Vec<_>>>()?;
        if configs.is_empty() {
            bail!("no files given in '{raw}'");
        }
        let snapshot = engine
            .adhoc_snapshot(configs, raw)
            .with_context(|| format!("failed to parse {raw}"))?;
        return Ok(SnapshotRef::Adhoc(Arc::new(snapshot)));
    }
    Ok(SnapshotRef::Stored(raw.to_string()))
}

/// Read a configuration file; the device id is the file stem.
pub fn read_device_file(path: &Path) -> Result<RawConfig> {
    let device_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("cannot derive a device id from {}", path.display()))?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(RawConfig::new(device_id, text))
}

pub fn build_scope(args: &ScopeArgs) -> CompareScope {
    let objects = DiffScope {
        categories: (!args.categories.is_empty())
            .then(|| args.categories.iter().copied().collect::<BTreeSet<_>>()),
        objects: (!args.objects.is_empty()).then(|| args.objects.iter().cloned().collect()),
    };
    CompareScope {
        devices: (!args.devices.is_empty()).then(|| args.devices.iter().cloned().collect()),
        pairs: args
            .pairs
            .iter()
            .map(|(source, target)| DevicePair {
                source: source.clone(),
                target: target.clone(),
            })
            .collect(),
        objects,
    }
}
