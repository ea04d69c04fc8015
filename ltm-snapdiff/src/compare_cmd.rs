use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ltm_snapdiff::classify::Severity;
use ltm_snapdiff::export::ExportFormat;
use ltm_snapdiff::report::{render_summary, render_text};
use tracing::warn;

use crate::cli::{CompareArgs, CompareFormat};
use crate::{build_scope, parse_side, path_guard, Session};

pub async fn run_compare(session: &Session, args: CompareArgs) -> Result<()> {
    let engine = session.engine(args.scope.live_dir.as_deref())?;
    let source = parse_side(&engine, &args.source)?;
    let target = parse_side(&engine, &args.target)?;
    let scope = build_scope(&args.scope);

    let result = engine
        .compare(&source, &target, &scope)
        .await
        .with_context(|| format!("failed to compare {} with {}", args.source, args.target))?;
    for error in &result.device_errors {
        warn!(device = %error.device_id, side = ?error.side, "{}", error.message);
    }

    if let Some(out_path) = &args.output {
        let mut inputs: Vec<&Path> = file_inputs(&args.source)
            .chain(file_inputs(&args.target))
            .map(Path::new)
            .collect();
        let db = session.output_inputs();
        inputs.extend(db.iter().map(|p| p.as_path()));
        path_guard::ensure_output_not_input(out_path, &inputs)?;

        let rendered = engine.export_comparison(&result, ExportFormat::from(args.format))?;
        fs::write(out_path, rendered)
            .with_context(|| format!("failed to write report {}", out_path.display()))?;
        println!("{}", render_summary(&result));
    } else if args.summary {
        println!("{}", render_summary(&result));
    } else {
        match args.format {
            CompareFormat::Text => {
                println!("{}", render_text(&result));
                println!();
                println!("{}", render_summary(&result));
            }
            other => println!("{}", engine.export_comparison(&result, ExportFormat::from(other))?),
        }
    }

    if args.strict {
        let critical = result
            .analysis
            .iter()
            .filter(|item| item.severity == Severity::Critical)
            .count();
        if result.security_impact || critical > 0 {
            bail!(
                "strict mode failed: security_impact={} critical_findings={critical}",
                result.security_impact
            );
        }
    }
    Ok(())
}

fn file_inputs(side: &str) -> impl Iterator<Item = &str> {
    side.strip_prefix("file:")
        .into_iter()
        .flat_map(|paths| paths.split(','))
        .filter(|p| !p.is_empty())
}
