use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tmsh_diff_core::{
    split_stanzas, tokenize, write_declaration, Dialect, FieldValue, Fields, ParseError,
    StanzaBody,
};

use crate::category::{classify_header, Category};

/// Field holding the verbatim body of an opaque object.
pub const DEFINITION_FIELD: &str = "definition";

/// One named configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub name: String,
    /// Declaration subtype such as the monitor or profile type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Declaration header, for example `ltm pool /Common/web-pool`.
    pub header: String,
    pub fields: Fields,
    /// Canonical text of the whole declaration.
    pub text: String,
}

/// All objects of one category, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSection {
    pub category: Category,
    pub objects: BTreeMap<String, ConfigObject>,
}

impl ObjectSection {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            objects: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConfigObject> {
        self.objects.get(name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Find one category among parsed sections.
pub fn find_section(sections: &[ObjectSection], category: Category) -> Option<&ObjectSection> {
    sections.iter().find(|section| section.category == category)
}

/// Malformed configuration text. Raised before anything is stored.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("{category} section: {source}")]
    Syntax {
        category: Category,
        #[source]
        source: ParseError,
    },
    #[error("{category} section: line {line}: duplicate object '{name}'")]
    DuplicateObject {
        category: Category,
        name: String,
        line: usize,
    },
}

impl SectionError {
    pub fn category(&self) -> Category {
        match self {
            SectionError::Syntax { category, .. } | SectionError::DuplicateObject { category, .. } => {
                *category
            }
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            SectionError::Syntax { source, .. } => source.line(),
            SectionError::DuplicateObject { line, .. } => Some(*line),
        }
    }

    fn syntax(source: ParseError) -> Self {
        let category = source
            .section()
            .and_then(tokenize)
            .map_or(Category::Other, |header| classify_header(&header).category);
        SectionError::Syntax { category, source }
    }
}

/// Field conventions of tmsh configuration text.
pub fn default_dialect() -> Dialect {
    let mut dialect = Dialect::default();
    for field in ["vlans", "options", "tm-options", "tags", "interfaces"] {
        dialect.unordered_fields.insert(field.to_string());
    }
    dialect
        .joined_fields
        .insert("monitor".to_string(), " and ".to_string());
    dialect
}

/// Splits raw configuration text into typed object sections.
#[derive(Debug, Clone)]
pub struct SectionParser {
    dialect: Dialect,
}

impl Default for SectionParser {
    fn default() -> Self {
        Self::new(default_dialect())
    }
}

impl SectionParser {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Parse configuration text into sections in category order.
    ///
    /// Only categories with at least one object are returned. Any syntax
    /// error fails the whole text.
    pub fn parse(&self, raw: &str) -> Result<Vec<ObjectSection>, SectionError> {
        let stanzas = split_stanzas(raw).map_err(SectionError::syntax)?;
        let mut sections: BTreeMap<Category, ObjectSection> = BTreeMap::new();

        for stanza in stanzas {
            let header = classify_header(&stanza.header);
            let header_text = stanza.header_text();
            let line = stanza.line;

            let (fields, body) = if header.category.is_opaque() {
                let body = trim_blank_edges(&stanza.verbatim());
                let mut fields = Fields::new();
                fields.insert(DEFINITION_FIELD, FieldValue::Script(body.clone()));
                (fields, StanzaBody::Opaque(body))
            } else {
                let parsed = stanza
                    .into_fields(&self.dialect)
                    .map_err(|source| SectionError::Syntax {
                        category: header.category,
                        source,
                    })?;
                match parsed.body {
                    StanzaBody::Fields(fields) => (fields.clone(), StanzaBody::Fields(fields)),
                    StanzaBody::Opaque(body) => (Fields::new(), StanzaBody::Opaque(body)),
                }
            };

            let object = ConfigObject {
                text: write_declaration(&header_text, &body, &self.dialect),
                name: header.name.clone(),
                kind: header.kind,
                header: header_text,
                fields,
            };

            let section = sections
                .entry(header.category)
                .or_insert_with(|| ObjectSection::new(header.category));
            if section.objects.contains_key(&header.name) {
                return Err(SectionError::DuplicateObject {
                    category: header.category,
                    name: header.name,
                    line,
                });
            }
            section.objects.insert(header.name, object);
        }

        Ok(sections.into_values().collect())
    }
}

fn trim_blank_edges(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let start = lines.iter().position(|line| !line.trim().is_empty());
    let end = lines.iter().rposition(|line| !line.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}
