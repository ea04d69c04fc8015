use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::parser::Dialect;
use crate::tree::{FieldValue, Fields, Stanza, StanzaBody};

const INDENT: &str = "    ";

/// Errors that can occur while writing configuration text.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to write output file.
    #[error("failed to write config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize stanzas into configuration text.
pub fn write(stanzas: &[Stanza], dialect: &Dialect) -> String {
    stanzas
        .iter()
        .map(|stanza| write_stanza(stanza, dialect))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize stanzas and write them to `path`.
pub fn write_file(stanzas: &[Stanza], dialect: &Dialect, path: &Path) -> Result<(), WriteError> {
    let mut text = write(stanzas, dialect);
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

/// Serialize one stanza in canonical form.
///
/// Field blocks are indented by four spaces per level; opaque bodies are
/// emitted exactly as stored.
pub fn write_stanza(stanza: &Stanza, dialect: &Dialect) -> String {
    write_declaration(&stanza.header_text(), &stanza.body, dialect)
}

/// Serialize a declaration from its header text and body.
pub fn write_declaration(header: &str, body: &StanzaBody, dialect: &Dialect) -> String {
    let mut out = String::new();
    match body {
        StanzaBody::Fields(fields) if fields.is_empty() => {
            let _ = write!(out, "{header} {{ }}");
        }
        StanzaBody::Opaque(text) if text.trim().is_empty() => {
            let _ = write!(out, "{header} {{ }}");
        }
        StanzaBody::Fields(fields) => {
            let _ = writeln!(out, "{header} {{");
            write_fields(&mut out, fields, dialect, 1);
            out.push('}');
        }
        StanzaBody::Opaque(text) => {
            let _ = writeln!(out, "{header} {{");
            let _ = writeln!(out, "{text}");
            out.push('}');
        }
    }
    out
}

/// Serialize a field block at the given indentation depth.
pub fn write_fields(out: &mut String, fields: &Fields, dialect: &Dialect, depth: usize) {
    let pad = INDENT.repeat(depth);
    for field in fields {
        let name = &field.name;
        match &field.value {
            FieldValue::Flag => {
                let _ = writeln!(out, "{pad}{name}");
            }
            FieldValue::Scalar(value) => {
                let _ = writeln!(out, "{pad}{name} {value}");
            }
            FieldValue::List(items) if !items.is_empty() && dialect.separator(name).is_some() => {
                let separator = dialect.separator(name).unwrap_or(" ");
                let _ = writeln!(out, "{pad}{name} {}", items.join(separator));
            }
            FieldValue::List(items) | FieldValue::Set(items) => {
                if items.is_empty() {
                    let _ = writeln!(out, "{pad}{name} {{ }}");
                    continue;
                }
                let _ = writeln!(out, "{pad}{name} {{");
                for item in items {
                    let _ = writeln!(out, "{pad}{INDENT}{item}");
                }
                let _ = writeln!(out, "{pad}}}");
            }
            FieldValue::Block(nested) => {
                if nested.is_empty() {
                    let _ = writeln!(out, "{pad}{name} {{ }}");
                    continue;
                }
                let _ = writeln!(out, "{pad}{name} {{");
                write_fields(out, nested, dialect, depth + 1);
                let _ = writeln!(out, "{pad}}}");
            }
            FieldValue::Script(body) => {
                let _ = writeln!(out, "{pad}{name} {{");
                let _ = writeln!(out, "{body}");
                let _ = writeln!(out, "{pad}}}");
            }
        }
    }
}
