use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use ltm_snapdiff::report::{render_backup, render_backups};
use ltm_snapdiff::snapshot::{RawConfig, SnapshotStatus};
use ltm_snapdiff::store::ListFilter;

use crate::cli::{
    BackupCommand, BackupCreateArgs, BackupDeleteArgs, BackupExpiredArgs, BackupListArgs,
    BackupShowArgs, OutputFormat,
};
use crate::Session;

pub async fn run_backup(session: &Session, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create(args) => run_create(session, args).await,
        BackupCommand::List(args) => run_list(session, args),
        BackupCommand::Show(args) => run_show(session, args),
        BackupCommand::Delete(args) => run_delete(session, args),
        BackupCommand::Expired(args) => run_expired(session, args),
    }
}

async fn run_create(session: &Session, args: BackupCreateArgs) -> Result<()> {
    let engine = session.engine(args.live_dir.as_deref())?;

    let snapshot = if args.fetch {
        let devices = (!args.fetch_devices.is_empty()).then_some(args.fetch_devices);
        if devices.is_none() && engine.registry().list_devices().is_empty() {
            bail!("no devices to fetch: pass --fetch-device or configure [[device]] entries");
        }
        engine
            .backup_devices(devices, &args.author, args.comment)
            .await
            .context("live backup failed")?
    } else {
        if args.devices.is_empty() {
            bail!("nothing to back up: pass --device ID=FILE or --fetch");
        }
        let configs = args
            .devices
            .iter()
            .map(|(id, path)| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))
                    .map(|text| RawConfig::new(id.clone(), text))
            })
            .collect::<Result<Vec<_>>>()?;
        engine
            .create_backup(configs, &args.author, args.comment)
            .context("backup failed")?
    };

    match args.format {
        OutputFormat::Text => println!("{}", render_backup(&snapshot)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    if snapshot.status == SnapshotStatus::Failed {
        bail!("backup {} captured no devices", snapshot.id);
    }
    Ok(())
}

fn run_list(session: &Session, args: BackupListArgs) -> Result<()> {
    let engine = session.engine(None)?;
    let filter = ListFilter {
        device: args.device,
        since: args.since.as_deref().map(parse_time).transpose()?,
        until: args.until.as_deref().map(parse_time).transpose()?,
        status: args.status,
        author: args.author,
        limit: args.limit,
    };
    let snapshots = engine.list_backups(&filter)?;
    match args.format {
        OutputFormat::Text => println!("{}", render_backups(&snapshots)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshots)?),
    }
    Ok(())
}

fn run_show(session: &Session, args: BackupShowArgs) -> Result<()> {
    let engine = session.engine(None)?;
    let snapshot = engine.get_backup(&args.id)?;
    match args.format {
        OutputFormat::Text => println!("{}", render_backup(&snapshot)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }
    Ok(())
}

fn run_delete(session: &Session, args: BackupDeleteArgs) -> Result<()> {
    let engine = session.engine(None)?;
    engine.delete_backup(&args.id)?;
    println!("deleted {}", args.id);
    Ok(())
}

fn run_expired(session: &Session, args: BackupExpiredArgs) -> Result<()> {
    let Some(days) = args.days.or(session.config.store.retention_days) else {
        bail!("no retention period: pass --days or set store.retention_days");
    };
    let engine = session.engine(None)?;
    let ids = engine.expired_backups(days)?;
    for id in &ids {
        if args.delete {
            engine.delete_backup(id)?;
            println!("deleted {id}");
        } else {
            println!("{id}");
        }
    }
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{raw}': expected RFC 3339 or YYYY-MM-DD"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .with_context(|| format!("invalid date '{raw}'"))
}
