use crate::diff::result::FieldChange;
use crate::tree::FieldValue;

/// Format field changes as plain text, one marker line per field.
pub fn format_text(changes: &[FieldChange]) -> String {
    let mut lines = Vec::with_capacity(changes.len());
    for change in changes {
        match change {
            FieldChange::Added { name, value } => {
                lines.push(format!("+ {name} {}", render_value(value)));
            }
            FieldChange::Removed { name, value } => {
                lines.push(format!("- {name} {}", render_value(value)));
            }
            FieldChange::Changed { name, old, new } => {
                lines.push(format!("~ {name}"));
                lines.push(format!("  old: {}", render_value(old)));
                lines.push(format!("  new: {}", render_value(new)));
            }
        }
    }
    lines.join("\n")
}

/// Format a simple summary of field change counts.
pub fn format_summary(changes: &[FieldChange]) -> String {
    let mut added = 0;
    let mut removed = 0;
    let mut changed = 0;

    for change in changes {
        match change {
            FieldChange::Added { .. } => added += 1,
            FieldChange::Removed { .. } => removed += 1,
            FieldChange::Changed { .. } => changed += 1,
        }
    }

    format!("added={added} removed={removed} changed={changed}")
}

/// Compact single-line rendering of a value.
pub fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Flag => "(flag)".to_string(),
        FieldValue::Scalar(text) => text.clone(),
        FieldValue::List(items) => format!("[{}]", items.join(", ")),
        FieldValue::Set(items) => format!("{{{}}}", items.join(", ")),
        FieldValue::Block(fields) => {
            let names: Vec<&str> = fields.names().collect();
            format!("{{ {} }}", names.join(" "))
        }
        FieldValue::Script(body) => format!("<script, {} lines>", body.lines().count()),
    }
}
