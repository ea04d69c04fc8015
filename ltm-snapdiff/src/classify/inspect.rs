use tmsh_diff_core::{value_grows, FieldChange, FieldValue, Fields};

use super::ClassifierSettings;
use crate::category::{is_ssl_kind, Category};
use crate::diff::{ChangeType, DiffRecord};

/// Whether a record only adds configuration: a new object, or a
/// modification that appends without removing or rewriting anything.
pub fn is_additive(record: &DiffRecord) -> bool {
    match record.change {
        ChangeType::Added => true,
        ChangeType::Removed => false,
        ChangeType::Modified => {
            !record.field_changes.is_empty()
                && record.field_changes.iter().all(|change| match change {
                    FieldChange::Added { .. } => true,
                    FieldChange::Removed { .. } => false,
                    FieldChange::Changed { old, new, .. } => value_grows(old, new),
                })
        }
    }
}

pub fn is_ssl_profile(record: &DiffRecord) -> bool {
    record.category == Category::Profiles && is_ssl_kind(record.kind.as_deref())
}

/// Weak cipher entries enabled by a cipher string, in order of appearance.
///
/// Entries negated with `!` or `-` are not enabled. An entry is weak when one
/// of its dash-separated parts matches a weak name.
pub fn enabled_weak_ciphers(ciphers: &str, weak: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let entries = ciphers
        .trim_matches('"')
        .split(|c: char| c == ':' || c == ',' || c.is_whitespace())
        .filter(|entry| !entry.is_empty());
    for entry in entries {
        if entry.starts_with('!') || entry.starts_with('-') {
            continue;
        }
        let entry = entry.trim_start_matches('+');
        let is_weak = entry
            .split(['-', '+'])
            .any(|part| weak.iter().any(|w| part.eq_ignore_ascii_case(w)));
        if is_weak && !out.iter().any(|seen| seen == entry) {
            out.push(entry.to_string());
        }
    }
    out
}

/// Reasons an SSL profile modification lowers its protection. Empty when it
/// does not.
pub fn ssl_weakening(record: &DiffRecord, settings: &ClassifierSettings) -> Vec<String> {
    if !is_ssl_profile(record) || record.change != ChangeType::Modified {
        return Vec::new();
    }

    let mut reasons = Vec::new();
    for change in &record.field_changes {
        match change.name() {
            "ciphers" => {
                let before = change
                    .old_value()
                    .map(|v| enabled_weak_ciphers(&value_text(v), &settings.weak_ciphers))
                    .unwrap_or_default();
                let Some(new) = change.new_value() else {
                    continue;
                };
                let introduced: Vec<String> =
                    enabled_weak_ciphers(&value_text(new), &settings.weak_ciphers)
                        .into_iter()
                        .filter(|entry| !before.contains(entry))
                        .collect();
                if !introduced.is_empty() {
                    reasons.push(format!("ciphers now enable {}", introduced.join(", ")));
                }
            }
            "options" | "tm-options" => {
                let old_items = change.old_value().map(FieldValue::items).unwrap_or_default();
                let new_items = change.new_value().map(FieldValue::items).unwrap_or_default();
                let dropped: Vec<&str> = old_items
                    .into_iter()
                    .filter(|item| !new_items.contains(item))
                    .filter(|item| settings.protective_options.iter().any(|p| p == item))
                    .collect();
                if !dropped.is_empty() {
                    reasons.push(format!(
                        "{} no longer include {}",
                        change.name(),
                        dropped.join(", ")
                    ));
                }
            }
            _ => {}
        }
    }
    reasons
}

/// Whether `needle` appears anywhere in a field block: as a field name, a
/// value token, a list item, or inside a script body.
pub fn mentions(fields: &Fields, needle: &str) -> bool {
    fields
        .iter()
        .any(|field| field.name == needle || value_mentions(&field.value, needle))
}

fn value_mentions(value: &FieldValue, needle: &str) -> bool {
    match value {
        FieldValue::Flag => false,
        FieldValue::Scalar(text) => text
            .split_whitespace()
            .any(|token| token.trim_matches('"') == needle),
        FieldValue::List(items) | FieldValue::Set(items) => items.iter().any(|i| i == needle),
        FieldValue::Block(nested) => mentions(nested, needle),
        FieldValue::Script(body) => body.contains(needle),
    }
}

fn value_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(text) => text.clone(),
        other => other.items().join(" "),
    }
}
