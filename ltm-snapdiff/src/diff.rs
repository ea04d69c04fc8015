use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tmsh_diff_core::{diff_fields_with_options, DiffOptions, FieldChange, Fields};

use crate::category::Category;
use crate::section::{ConfigObject, ObjectSection};

/// How an object differs between the old and new side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            ChangeType::Added => ChangeType::Removed,
            ChangeType::Removed => ChangeType::Added,
            ChangeType::Modified => ChangeType::Modified,
        }
    }
}

/// One object-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub category: Category,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub change: ChangeType,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
    /// Field-level detail of a modification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_changes: Vec<FieldChange>,
    #[serde(skip_serializing, default)]
    pub old_fields: Option<Fields>,
    #[serde(skip_serializing, default)]
    pub new_fields: Option<Fields>,
}

impl DiffRecord {
    fn added(category: Category, object: &ConfigObject) -> Self {
        Self {
            device: None,
            category,
            name: object.name.clone(),
            kind: object.kind.clone(),
            change: ChangeType::Added,
            old_text: None,
            new_text: Some(object.text.clone()),
            field_changes: Vec::new(),
            old_fields: None,
            new_fields: Some(object.fields.clone()),
        }
    }

    fn removed(category: Category, object: &ConfigObject) -> Self {
        Self {
            device: None,
            category,
            name: object.name.clone(),
            kind: object.kind.clone(),
            change: ChangeType::Removed,
            old_text: Some(object.text.clone()),
            new_text: None,
            field_changes: Vec::new(),
            old_fields: Some(object.fields.clone()),
            new_fields: None,
        }
    }

    fn modified(
        category: Category,
        old: &ConfigObject,
        new: &ConfigObject,
        options: &DiffOptions,
    ) -> Option<Self> {
        let field_changes = diff_fields_with_options(&old.fields, &new.fields, options);
        if field_changes.is_empty() && old.kind == new.kind {
            return None;
        }
        if old.text == new.text {
            return None;
        }
        Some(Self {
            device: None,
            category,
            name: new.name.clone(),
            kind: new.kind.clone().or_else(|| old.kind.clone()),
            change: ChangeType::Modified,
            old_text: Some(old.text.clone()),
            new_text: Some(new.text.clone()),
            field_changes,
            old_fields: Some(old.fields.clone()),
            new_fields: Some(new.fields.clone()),
        })
    }

    /// The same difference seen from the other side.
    pub fn inverted(&self) -> Self {
        Self {
            device: self.device.clone(),
            category: self.category,
            name: self.name.clone(),
            kind: self.kind.clone(),
            change: self.change.inverted(),
            old_text: self.new_text.clone(),
            new_text: self.old_text.clone(),
            field_changes: self.field_changes.iter().map(FieldChange::inverted).collect(),
            old_fields: self.new_fields.clone(),
            new_fields: self.old_fields.clone(),
        }
    }

    /// Full fields of the side that still has the object, new side first.
    pub fn current_fields(&self) -> Option<&Fields> {
        self.new_fields.as_ref().or(self.old_fields.as_ref())
    }

    /// Names of the top-level fields touched by a modification.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.field_changes.iter().map(FieldChange::name).collect()
    }
}

/// Restricts a diff to some categories and object names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeSet<Category>>,
    /// Object names; a bare name also matches any partition path ending in it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<BTreeSet<String>>,
}

impl DiffScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn categories<I: IntoIterator<Item = Category>>(categories: I) -> Self {
        Self {
            categories: Some(categories.into_iter().collect()),
            objects: None,
        }
    }

    pub fn includes_category(&self, category: Category) -> bool {
        self.categories
            .as_ref()
            .map_or(true, |set| set.contains(&category))
    }

    pub fn includes_object(&self, name: &str) -> bool {
        self.objects.as_ref().map_or(true, |set| {
            set.iter().any(|wanted| {
                name == wanted
                    || name
                        .strip_suffix(wanted.as_str())
                        .is_some_and(|prefix| prefix.ends_with('/'))
            })
        })
    }
}

/// Compares two sets of object sections.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Ignore these top-level fields when comparing objects.
    pub fn with_ignored_fields(fields: Vec<String>) -> Self {
        Self::new(DiffOptions {
            ignore_fields: fields,
        })
    }

    pub fn diff(&self, old: &[ObjectSection], new: &[ObjectSection]) -> Vec<DiffRecord> {
        self.diff_scoped(old, new, &DiffScope::all())
    }

    /// Object-level differences ordered by category, then name.
    ///
    /// Categories missing on one side count as empty.
    pub fn diff_scoped(
        &self,
        old: &[ObjectSection],
        new: &[ObjectSection],
        scope: &DiffScope,
    ) -> Vec<DiffRecord> {
        let old_by_category = by_category(old);
        let new_by_category = by_category(new);
        let categories: BTreeSet<Category> = old_by_category
            .keys()
            .chain(new_by_category.keys())
            .copied()
            .collect();

        let mut out = Vec::new();
        for category in categories {
            if !scope.includes_category(category) {
                continue;
            }
            let empty = BTreeMap::new();
            let old_objects = old_by_category.get(&category).map_or(&empty, |s| &s.objects);
            let new_objects = new_by_category.get(&category).map_or(&empty, |s| &s.objects);
            let names: BTreeSet<&String> = old_objects.keys().chain(new_objects.keys()).collect();

            for name in names {
                if !scope.includes_object(name) {
                    continue;
                }
                let record = match (old_objects.get(name), new_objects.get(name)) {
                    (Some(old), Some(new)) => {
                        DiffRecord::modified(category, old, new, &self.options)
                    }
                    (Some(old), None) => Some(DiffRecord::removed(category, old)),
                    (None, Some(new)) => Some(DiffRecord::added(category, new)),
                    (None, None) => None,
                };
                out.extend(record);
            }
        }
        out
    }
}

fn by_category(sections: &[ObjectSection]) -> BTreeMap<Category, &ObjectSection> {
    sections.iter().map(|s| (s.category, s)).collect()
}

/// Diff with default options.
pub fn diff(old: &[ObjectSection], new: &[ObjectSection]) -> Vec<DiffRecord> {
    DiffEngine::default().diff(old, new)
}
