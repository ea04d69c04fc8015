use std::collections::BTreeSet;

use crate::diff::result::FieldChange;
use crate::tree::{FieldValue, Fields};

/// Configures field comparison behavior.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Top-level field names excluded from comparison.
    pub ignore_fields: Vec<String>,
}

/// Compare two field blocks with default options.
pub fn diff_fields(old: &Fields, new: &Fields) -> Vec<FieldChange> {
    diff_fields_with_options(old, new, &DiffOptions::default())
}

/// Compare two field blocks with custom options.
///
/// Changes are ordered by field name so that comparing in either direction
/// yields the same sequence with sides swapped.
pub fn diff_fields_with_options(old: &Fields, new: &Fields, opts: &DiffOptions) -> Vec<FieldChange> {
    let old_map = old.by_name();
    let new_map = new.by_name();
    let names: BTreeSet<&str> = old_map.keys().chain(new_map.keys()).copied().collect();

    let mut out = Vec::new();
    for name in names {
        if should_ignore(name, opts) {
            continue;
        }
        match (old_map.get(name), new_map.get(name)) {
            (Some(old_value), Some(new_value)) => {
                if !values_equal(old_value, new_value) {
                    out.push(FieldChange::Changed {
                        name: name.to_string(),
                        old: (*old_value).clone(),
                        new: (*new_value).clone(),
                    });
                }
            }
            (Some(old_value), None) => out.push(FieldChange::Removed {
                name: name.to_string(),
                value: (*old_value).clone(),
            }),
            (None, Some(new_value)) => out.push(FieldChange::Added {
                name: name.to_string(),
                value: (*new_value).clone(),
            }),
            (None, None) => {}
        }
    }
    out
}

/// Normalized equality of two blocks: field order is ignored, values compare
/// with [`values_equal`].
pub fn fields_equal(a: &Fields, b: &Fields) -> bool {
    let a_map = a.by_name();
    let b_map = b.by_name();
    a_map.len() == b_map.len()
        && a_map.iter().all(|(name, a_value)| {
            b_map
                .get(name)
                .is_some_and(|b_value| values_equal(a_value, b_value))
        })
}

/// Normalized equality of two values.
///
/// Lists are order sensitive, sets are stored sorted, nested blocks compare
/// by field name.
pub fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Block(a), FieldValue::Block(b)) => fields_equal(a, b),
        _ => a == b,
    }
}

/// Whether `new` only extends `old`: nothing removed or rewritten, only
/// entries appended or nested blocks grown.
pub fn value_grows(old: &FieldValue, new: &FieldValue) -> bool {
    if values_equal(old, new) {
        return true;
    }
    match (old, new) {
        (FieldValue::Block(old), FieldValue::Block(new)) => fields_grow(old, new),
        (FieldValue::List(old), FieldValue::List(new)) => is_subsequence(old, new),
        (FieldValue::Set(old), FieldValue::Set(new)) => old.iter().all(|item| new.contains(item)),
        _ => false,
    }
}

/// Block form of [`value_grows`]: every old field survives and grows.
pub fn fields_grow(old: &Fields, new: &Fields) -> bool {
    old.iter().all(|field| {
        new.get(&field.name)
            .is_some_and(|new_value| value_grows(&field.value, new_value))
    })
}

fn is_subsequence(needle: &[String], haystack: &[String]) -> bool {
    let mut remaining = haystack.iter();
    needle
        .iter()
        .all(|item| remaining.by_ref().any(|candidate| candidate == item))
}

fn should_ignore(name: &str, opts: &DiffOptions) -> bool {
    opts.ignore_fields.iter().any(|ignore| ignore == name)
}
