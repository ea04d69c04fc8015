//! Generic parsing, writing and field-level comparison for brace-structured,
//! tmsh-style configuration text.

pub mod diff;
pub mod format;
pub mod parser;
pub mod tree;
pub mod writer;

pub use diff::{
    diff_fields, diff_fields_with_options, fields_equal, fields_grow, value_grows, values_equal,
    DiffOptions, FieldChange,
};
pub use format::{format_json, format_summary, format_text, render_value};
pub use parser::{parse, parse_file, split_stanzas, tokenize, Dialect, ParseError, RawStanza};
pub use tree::{Field, FieldValue, Fields, Stanza, StanzaBody};
pub use writer::{write, write_declaration, write_fields, write_file, write_stanza, WriteError};
