use serde::{Deserialize, Serialize};

use crate::tree::FieldValue;

/// A single field-level difference between two blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldChange {
    /// Field only present on the new side.
    Added { name: String, value: FieldValue },
    /// Field only present on the old side.
    Removed { name: String, value: FieldValue },
    /// Field present on both sides with different values.
    Changed {
        name: String,
        old: FieldValue,
        new: FieldValue,
    },
}

impl FieldChange {
    pub fn name(&self) -> &str {
        match self {
            FieldChange::Added { name, .. }
            | FieldChange::Removed { name, .. }
            | FieldChange::Changed { name, .. } => name,
        }
    }

    /// Value before the change, if the field existed.
    pub fn old_value(&self) -> Option<&FieldValue> {
        match self {
            FieldChange::Removed { value, .. } => Some(value),
            FieldChange::Changed { old, .. } => Some(old),
            FieldChange::Added { .. } => None,
        }
    }

    /// Value after the change, if the field still exists.
    pub fn new_value(&self) -> Option<&FieldValue> {
        match self {
            FieldChange::Added { value, .. } => Some(value),
            FieldChange::Changed { new, .. } => Some(new),
            FieldChange::Removed { .. } => None,
        }
    }

    /// The same change seen from the other side.
    pub fn inverted(&self) -> FieldChange {
        match self {
            FieldChange::Added { name, value } => FieldChange::Removed {
                name: name.clone(),
                value: value.clone(),
            },
            FieldChange::Removed { name, value } => FieldChange::Added {
                name: name.clone(),
                value: value.clone(),
            },
            FieldChange::Changed { name, old, new } => FieldChange::Changed {
                name: name.clone(),
                old: new.clone(),
                new: old.clone(),
            },
        }
    }
}
