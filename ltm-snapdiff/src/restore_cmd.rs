use std::sync::Arc;

use anyhow::{bail, Result};
use ltm_snapdiff::report::{render_restore, render_summary};
use ltm_snapdiff::restore::{DirectoryApplier, RestoreRequest, RestoreState};

use crate::cli::{OutputFormat, RestoreArgs};
use crate::{build_scope, parse_side, Session};

pub async fn run_restore(session: &Session, args: RestoreArgs) -> Result<()> {
    if args.source == "live" || args.source.starts_with("live@") || args.source.starts_with("file:") {
        bail!("restore source must be a stored snapshot id, got '{}'", args.source);
    }

    let mut engine = session.engine(args.scope.live_dir.as_deref())?;
    if let Some(dir) = &args.apply_dir {
        engine = engine.with_applier(Arc::new(DirectoryApplier::new(dir.clone())));
    }
    let target = parse_side(&engine, &args.target)?;
    let request = RestoreRequest {
        source_id: args.source.clone(),
        target,
        scope: build_scope(&args.scope),
        dry_run: args.dry_run,
    };

    let job = engine.stage_restore(request).await;
    match args.format {
        OutputFormat::Text => {
            println!("{}", render_restore(&job));
            if let Some(comparison) = &job.comparison {
                println!("{}", render_summary(comparison));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
    }

    if job.state == RestoreState::Failed {
        bail!(
            "restore {} failed: {}",
            job.id,
            job.failure.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
