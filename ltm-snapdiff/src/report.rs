use colored::Colorize;

use crate::compare::ComparisonResult;
use crate::export::to_text;
use crate::restore::{ApplyAction, RestoreJob, RestoreState};
use crate::snapshot::{Snapshot, SnapshotStatus};

/// Render a comparison for terminal output.
pub fn render_text(result: &ComparisonResult) -> String {
    colorize(&to_text(result))
}

fn colorize(raw: &str) -> String {
    let mut out = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        let colored = if trimmed.starts_with('+') {
            line.green().to_string()
        } else if trimmed.starts_with('-') {
            line.red().to_string()
        } else if trimmed.starts_with('~') {
            line.yellow().to_string()
        } else if trimmed.starts_with('!') {
            line.magenta().to_string()
        } else if trimmed.starts_with("* SECURITY") {
            line.bright_red().to_string()
        } else if line.starts_with('[') {
            line.bold().to_string()
        } else {
            line.to_string()
        };
        out.push(colored);
    }

    out.join("\n")
}

/// Render summary counts for terminal output.
pub fn render_summary(result: &ComparisonResult) -> String {
    let mut line = format!(
        "{} security_impact={} service_impact={}",
        result.summary, result.security_impact, result.service_impact
    );
    if result.is_partial() {
        line.push_str(" partial=true");
    }
    line.cyan().to_string()
}

/// Render a snapshot listing, newest first.
pub fn render_backups(snapshots: &[Snapshot]) -> String {
    if snapshots.is_empty() {
        return "no backups".to_string();
    }
    let mut out = Vec::new();
    for snapshot in snapshots {
        let status = match snapshot.status {
            SnapshotStatus::Success => snapshot.status.as_str().green(),
            SnapshotStatus::Partial => snapshot.status.as_str().yellow(),
            SnapshotStatus::Failed => snapshot.status.as_str().red(),
        };
        out.push(format!(
            "{} {} {} author={} devices={} objects={}{}",
            snapshot.id,
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            status,
            snapshot.author,
            snapshot.device_ids().join(","),
            snapshot.object_count(),
            snapshot
                .comment
                .as_deref()
                .map(|c| format!(" comment={c:?}"))
                .unwrap_or_default()
        ));
    }
    out.join("\n")
}

/// Render one snapshot with its devices and capture errors.
pub fn render_backup(snapshot: &Snapshot) -> String {
    let mut out = vec![
        format!("id: {}", snapshot.id),
        format!("created: {}", snapshot.created_at.to_rfc3339()),
        format!("author: {}", snapshot.author),
        format!("status: {}", snapshot.status.as_str()),
    ];
    if let Some(comment) = &snapshot.comment {
        out.push(format!("comment: {comment}"));
    }
    out.push("devices".to_string());
    for device in &snapshot.devices {
        let counts = device
            .sections
            .iter()
            .map(|section| format!("{}={}", section.category, section.len()))
            .collect::<Vec<_>>()
            .join(" ");
        out.push(format!("- {}: {counts}", device.device_id));
    }
    for error in &snapshot.errors {
        out.push(format!("! {}: {}", error.device_id, error.message).magenta().to_string());
    }
    out.join("\n")
}

/// Render a restore job: its plan, then the outcome per device.
pub fn render_restore(job: &RestoreJob) -> String {
    let mut out = Vec::new();
    let state = match job.state {
        RestoreState::Applied => "applied".green(),
        RestoreState::Previewed => "previewed".cyan(),
        RestoreState::Staged => "staged".normal(),
        RestoreState::Failed => "failed".red(),
    };
    out.push(format!(
        "restore {} {} -> {} {state}",
        job.id, job.source_id, job.target
    ));

    for plan in &job.plan {
        out.push(format!("[{}]", plan.device_id).bold().to_string());
        for object in &plan.objects {
            let line = match object.action {
                ApplyAction::Create => format!("+ create {} {}", object.category, object.name).green(),
                ApplyAction::Replace => format!("~ replace {} {}", object.category, object.name).yellow(),
                ApplyAction::Delete => format!("- delete {} {}", object.category, object.name).red(),
            };
            out.push(line.to_string());
        }
    }
    if job.plan.is_empty() && job.failure.is_none() {
        out.push("nothing to restore".to_string());
    }

    for report in &job.device_reports {
        out.push(format!(
            "{}: applied={} failed={}",
            report.device_id,
            report.applied.len(),
            report.failed.len()
        ));
        if !report.failed_categories.is_empty() {
            let names = report
                .failed_categories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.push(format!("! {} failed categories: {names}", report.device_id).magenta().to_string());
        }
    }
    if let Some(failure) = &job.failure {
        out.push(format!("! {failure}").magenta().to_string());
    }
    out.join("\n")
}
