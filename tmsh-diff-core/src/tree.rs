use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// A typed field value inside a configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Bare keyword with no value (for example `vlans-disabled`).
    Flag,
    /// Single value, kept verbatim including any quotes.
    Scalar(String),
    /// Ordered list; equality is order sensitive.
    List(Vec<String>),
    /// Order-insensitive list, stored sorted and de-duplicated.
    Set(Vec<String>),
    /// Nested block of named fields.
    Block(Fields),
    /// Opaque body kept verbatim (scripts, unknown constructs).
    Script(String),
}

impl FieldValue {
    /// Build a normalized set value.
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = items.into_iter().map(Into::into).collect();
        FieldValue::Set(sorted.into_iter().collect())
    }

    /// Return scalar text if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Return list-like items (`List` or `Set`), or a one-item view of a scalar.
    pub fn items(&self) -> Vec<&str> {
        match self {
            FieldValue::List(items) | FieldValue::Set(items) => {
                items.iter().map(String::as_str).collect()
            }
            FieldValue::Scalar(value) => value.split_whitespace().collect(),
            _ => Vec::new(),
        }
    }

    /// Return the nested block if this is one.
    pub fn as_block(&self) -> Option<&Fields> {
        match self {
            FieldValue::Block(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short variant name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Flag => "flag",
            FieldValue::Scalar(_) => "scalar",
            FieldValue::List(_) => "list",
            FieldValue::Set(_) => "set",
            FieldValue::Block(_) => "block",
            FieldValue::Script(_) => "script",
        }
    }
}

/// One named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered field collection. Insertion order is kept for stable writing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Vec<Field>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a field. Returns `false` without inserting when the name exists.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.0.push(Field { name, value });
        true
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Walk nested blocks and return the terminal value if found.
    pub fn get_path(&self, path: &[&str]) -> Option<&FieldValue> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.get(segment)?.as_block()?;
        }
        current.get(last)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|field| field.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|field| field.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// View keyed by name, for order-independent comparison.
    pub fn by_name(&self) -> BTreeMap<&str, &FieldValue> {
        self.0
            .iter()
            .map(|field| (field.name.as_str(), &field.value))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Body of a top-level stanza.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StanzaBody {
    /// Parsed field block.
    Fields(Fields),
    /// Verbatim lines, used when the body is not field structured.
    Opaque(String),
}

/// A top-level declaration such as `ltm pool /Common/web-pool { ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stanza {
    /// Declaration tokens before the opening brace.
    pub header: Vec<String>,
    pub body: StanzaBody,
    /// 1-based line number of the declaration in the source text.
    pub line: usize,
}

impl Stanza {
    /// Declaration text as it appears before the opening brace.
    pub fn header_text(&self) -> String {
        self.header.join(" ")
    }

    /// Last header token, the object name for most declarations.
    pub fn name(&self) -> Option<&str> {
        self.header.last().map(String::as_str)
    }

    pub fn fields(&self) -> Option<&Fields> {
        match &self.body {
            StanzaBody::Fields(fields) => Some(fields),
            StanzaBody::Opaque(_) => None,
        }
    }
}

impl Display for Stanza {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let count = match &self.body {
            StanzaBody::Fields(fields) => fields.len(),
            StanzaBody::Opaque(body) => body.lines().count(),
        };
        write!(f, "{} ({} entries)", self.header_text(), count)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Fields};

    #[test]
    fn get_path_walks_nested_blocks() {
        let mut member = Fields::new();
        member.insert("address", FieldValue::Scalar("10.0.0.1".to_string()));
        let mut members = Fields::new();
        members.insert("/Common/10.0.0.1:80", FieldValue::Block(member));
        let mut root = Fields::new();
        root.insert("members", FieldValue::Block(members));

        assert_eq!(
            root.get_path(&["members", "/Common/10.0.0.1:80", "address"]),
            Some(&FieldValue::Scalar("10.0.0.1".to_string()))
        );
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let mut fields = Fields::new();
        assert!(fields.insert("pool", FieldValue::Flag));
        assert!(!fields.insert("pool", FieldValue::Flag));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn set_values_are_sorted_and_unique() {
        let value = FieldValue::set(["b", "a", "b"]);
        assert_eq!(
            value,
            FieldValue::Set(vec!["a".to_string(), "b".to_string()])
        );
    }
}
