use crate::diff::result::FieldChange;

/// Format field changes as JSON.
pub fn format_json(changes: &[FieldChange]) -> String {
    serde_json::to_string_pretty(changes).unwrap_or_else(|_| "[]".to_string())
}
