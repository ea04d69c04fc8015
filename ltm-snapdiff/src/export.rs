//! Plain renderings of a [`ComparisonResult`] for files and pipes.

use std::fmt::Write as _;
use std::str::FromStr;

use similar::{ChangeTag, TextDiff};
use thiserror::Error;
use tmsh_diff_core::format_text;

use crate::classify::ImpactKind;
use crate::compare::ComparisonResult;
use crate::diff::{ChangeType, DiffRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Html,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode comparison as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV report: {0}")]
    Csv(#[from] csv::Error),
}

pub fn export(result: &ComparisonResult, format: ExportFormat) -> Result<String, ExportError> {
    Ok(match format {
        ExportFormat::Text => to_text(result),
        ExportFormat::Json => serde_json::to_string_pretty(result)?,
        ExportFormat::Html => to_html(result),
        ExportFormat::Csv => to_csv(result)?,
    })
}

fn marker(change: ChangeType) -> char {
    match change {
        ChangeType::Added => '+',
        ChangeType::Removed => '-',
        ChangeType::Modified => '~',
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn impact_label(kind: ImpactKind) -> &'static str {
    match kind {
        ImpactKind::Security => "SECURITY",
        ImpactKind::Service => "SERVICE",
        ImpactKind::Informational => "INFO",
    }
}

/// Line-oriented report. Change lines start with `+`, `-` or `~`, device
/// errors with `!`.
pub fn to_text(result: &ComparisonResult) -> String {
    let mut out = Vec::new();
    out.push(format!("comparison {} -> {}", result.source, result.target));
    out.push(format!("summary {}", result.summary));
    out.push(format!(
        "impact security={} service={}",
        yes_no(result.security_impact),
        yes_no(result.service_impact)
    ));

    let mut heading: Option<(Option<&str>, String)> = None;
    for record in &result.records {
        let current = (record.device.as_deref(), record.category.to_string());
        if heading.as_ref() != Some(&current) {
            out.push(String::new());
            match current.0 {
                Some(device) => out.push(format!("[{device}] {}", current.1)),
                None => out.push(format!("[{}]", current.1)),
            }
            heading = Some(current);
        }
        out.push(format!("{} {}", marker(record.change), record.name));
        if !record.field_changes.is_empty() {
            for line in format_text(&record.field_changes).lines() {
                out.push(format!("    {line}"));
            }
        }
    }

    if !result.analysis.is_empty() {
        out.push(String::new());
        out.push("analysis".to_string());
        for item in &result.analysis {
            let mut line = format!(
                "* {} {} {}: {}",
                impact_label(item.kind),
                item.severity.as_str(),
                item.rule,
                item.message
            );
            if let Some(device) = item.device_name.as_ref().or(item.device.as_ref()) {
                let _ = write!(line, " [{device}]");
            }
            out.push(line);
            if let Some(detail) = &item.detail {
                out.push(format!("    {detail}"));
            }
        }
    }

    if !result.recommendations.is_empty() {
        out.push(String::new());
        out.push("recommendations".to_string());
        for rec in &result.recommendations {
            out.push(format!("* {}", rec.message));
        }
    }

    if !result.device_errors.is_empty() || !result.unpaired_devices.is_empty() {
        out.push(String::new());
        out.push("incomplete".to_string());
        for err in &result.device_errors {
            let side = match err.side {
                crate::compare::Side::Source => "source",
                crate::compare::Side::Target => "target",
            };
            out.push(format!("! {} ({side}): {}", err.device_id, err.message));
        }
        for device in &result.unpaired_devices {
            out.push(format!("! {device}: present on one side only"));
        }
    }

    out.join("\n")
}

/// One row per record.
pub fn to_csv(result: &ComparisonResult) -> Result<String, ExportError> {
    records_csv(&result.records)
}

fn records_csv(records: &[DiffRecord]) -> Result<String, ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    wtr.write_record(["device", "category", "object", "kind", "change", "changed_fields"])?;
    for record in records {
        wtr.write_record([
            record.device.clone().unwrap_or_default(),
            record.category.to_string(),
            record.name.clone(),
            record.kind.clone().unwrap_or_default(),
            record.change.as_str().to_string(),
            record.changed_fields().join(";"),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Standalone HTML page with line diffs of modified objects.
pub fn to_html(result: &ComparisonResult) -> String {
    let mut out = String::new();
    let title = format!("{} -> {}", result.source, result.target);
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><meta charset=\"utf-8\"><title>{}</title>", escape(&title));
    let _ = writeln!(
        out,
        "<style>body{{font-family:sans-serif}}pre{{background:#f6f8fa;padding:8px}}\
         .added{{color:#116329}}.removed{{color:#82071e}}.modified{{color:#9a6700}}\
         ins{{background:#dafbe1;text-decoration:none}}del{{background:#ffebe9}}</style>"
    );
    let _ = writeln!(out, "</head><body>");
    let _ = writeln!(out, "<h1>{}</h1>", escape(&title));
    let _ = writeln!(
        out,
        "<p>{} &middot; security impact: {} &middot; service impact: {}</p>",
        escape(&result.summary.to_string()),
        yes_no(result.security_impact),
        yes_no(result.service_impact)
    );

    if !result.analysis.is_empty() {
        let _ = writeln!(out, "<h2>Analysis</h2><ul>");
        for item in &result.analysis {
            let _ = writeln!(
                out,
                "<li><strong>{} {}</strong> {}</li>",
                impact_label(item.kind),
                item.severity.as_str(),
                escape(&item.message)
            );
        }
        let _ = writeln!(out, "</ul>");
    }
    if !result.recommendations.is_empty() {
        let _ = writeln!(out, "<h2>Recommendations</h2><ul>");
        for rec in &result.recommendations {
            let _ = writeln!(out, "<li>{}</li>", escape(&rec.message));
        }
        let _ = writeln!(out, "</ul>");
    }
    if !result.device_errors.is_empty() {
        let _ = writeln!(out, "<h2>Devices not compared</h2><ul>");
        for err in &result.device_errors {
            let _ = writeln!(out, "<li>{}</li>", escape(&err.to_string()));
        }
        let _ = writeln!(out, "</ul>");
    }

    let _ = writeln!(out, "<h2>Changes</h2>");
    for record in &result.records {
        let class = record.change.as_str();
        let _ = writeln!(
            out,
            "<h3 class=\"{class}\">{} {} <small>{}{}</small></h3>",
            marker(record.change),
            escape(&record.name),
            record.category,
            record
                .device
                .as_deref()
                .map(|d| format!(" &middot; {}", escape(d)))
                .unwrap_or_default()
        );
        let _ = writeln!(out, "<pre>{}</pre>", html_body(record));
    }
    let _ = writeln!(out, "</body></html>");
    out
}

fn html_body(record: &DiffRecord) -> String {
    match (&record.old_text, &record.new_text) {
        (Some(old), Some(new)) => line_diff_html(old, new),
        (Some(text), None) => format!("<del>{}</del>", escape(text)),
        (None, Some(text)) => format!("<ins>{}</ins>", escape(text)),
        (None, None) => String::new(),
    }
}

fn line_diff_html(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let line = escape(change.value());
        match change.tag() {
            ChangeTag::Delete => {
                let _ = write!(out, "<del>-{line}</del>");
            }
            ChangeTag::Insert => {
                let _ = write!(out, "<ins>+{line}</ins>");
            }
            ChangeTag::Equal => {
                let _ = write!(out, " {line}");
            }
        }
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

/// Unified-style line diff of two declaration texts.
pub fn line_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{escape, line_diff, records_csv, ExportFormat};
    use crate::diff::diff;
    use crate::section::SectionParser;

    #[test]
    fn csv_quotes_only_cells_that_need_it() {
        let parser = SectionParser::default();
        let old = parser
            .parse("ltm pool /Common/p {\n    monitor /Common/http\n}\n")
            .unwrap();
        let new = parser
            .parse("ltm pool /Common/p {\n    monitor /Common/tcp\n}\nnet vlan /Common/a,b {\n    tag 10\n}\n")
            .unwrap();
        let mut records = diff(&old, &new);
        for record in &mut records {
            record.device = Some("edge-a".to_string());
        }

        let csv = records_csv(&records).unwrap();
        assert_eq!(
            csv,
            "device,category,object,kind,change,changed_fields\n\
             edge-a,pools,/Common/p,,modified,monitor\n\
             edge-a,other,\"net vlan /Common/a,b\",,added,\n"
        );
    }

    #[test]
    fn html_escapes_markup() {
        assert_eq!(escape("<b> & \"x\""), "&lt;b&gt; &amp; &quot;x&quot;");
    }

    #[test]
    fn line_diff_marks_changed_lines() {
        let diff = line_diff("a\nb\n", "a\nc\n");
        assert_eq!(diff, " a\n-b\n+c\n");
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
