use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::tree::{FieldValue, Fields, Stanza, StanzaBody};

/// Errors that can occur while parsing configuration text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Braces do not balance inside a declaration.
    #[error("line {line}: unbalanced braces in '{section}': {reason} (`{text}`)")]
    Unbalanced {
        section: String,
        line: usize,
        text: String,
        reason: String,
    },
    /// A quoted value is not closed on its line.
    #[error("line {line}: unterminated quote in '{section}' (`{text}`)")]
    UnterminatedQuote {
        section: String,
        line: usize,
        text: String,
    },
    /// A top-level line is not a `<header> {` declaration.
    #[error("line {line}: expected a declaration, found `{text}`")]
    ExpectedDeclaration { line: usize, text: String },
    /// The same field name appears twice in one block.
    #[error("line {line}: duplicate field '{field}' in '{section}'")]
    DuplicateField {
        section: String,
        field: String,
        line: usize,
    },
    /// Failed to read input file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Declaration the error was raised in, when known.
    pub fn section(&self) -> Option<&str> {
        match self {
            ParseError::Unbalanced { section, .. }
            | ParseError::UnterminatedQuote { section, .. }
            | ParseError::DuplicateField { section, .. } => Some(section),
            ParseError::ExpectedDeclaration { .. } | ParseError::Io(_) => None,
        }
    }

    /// 1-based source line, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Unbalanced { line, .. }
            | ParseError::UnterminatedQuote { line, .. }
            | ParseError::ExpectedDeclaration { line, .. }
            | ParseError::DuplicateField { line, .. } => Some(*line),
            ParseError::Io(_) => None,
        }
    }
}

/// Field-level conventions of a configuration dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dialect {
    /// Fields whose list values are order-insensitive and stored sorted.
    pub unordered_fields: BTreeSet<String>,
    /// Fields whose list values are written inline joined by a separator
    /// (for example `monitor a and b`).
    pub joined_fields: BTreeMap<String, String>,
}

impl Dialect {
    pub fn is_unordered(&self, field: &str) -> bool {
        self.unordered_fields.contains(field)
    }

    pub fn separator(&self, field: &str) -> Option<&str> {
        self.joined_fields.get(field).map(String::as_str)
    }
}

/// A top-level declaration split out of the source text, body not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStanza {
    pub header: Vec<String>,
    /// 1-based line of the declaration.
    pub line: usize,
    /// Body lines with their 1-based line numbers, trailing whitespace trimmed.
    pub body: Vec<(usize, String)>,
}

impl RawStanza {
    pub fn header_text(&self) -> String {
        self.header.join(" ")
    }

    /// Body lines joined verbatim.
    pub fn verbatim(&self) -> String {
        self.body
            .iter()
            .map(|(_, line)| line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Keep the body as an opaque stanza.
    pub fn into_opaque(self) -> Stanza {
        let body = self.verbatim();
        Stanza {
            header: self.header,
            body: StanzaBody::Opaque(body),
            line: self.line,
        }
    }

    /// Parse the body into fields.
    pub fn into_fields(self, dialect: &Dialect) -> Result<Stanza, ParseError> {
        let fields = parse_fields(&self, dialect)?;
        Ok(Stanza {
            header: self.header,
            body: StanzaBody::Fields(fields),
            line: self.line,
        })
    }
}

/// Parse configuration text, treating every stanza body as a field block.
pub fn parse(text: &str, dialect: &Dialect) -> Result<Vec<Stanza>, ParseError> {
    split_stanzas(text)?
        .into_iter()
        .map(|raw| raw.into_fields(dialect))
        .collect()
}

/// Parse a configuration file into stanzas.
pub fn parse_file(path: &Path, dialect: &Dialect) -> Result<Vec<Stanza>, ParseError> {
    let text = fs::read_to_string(path)?;
    parse(&text, dialect)
}

/// Split source text into top-level declarations by brace depth.
///
/// Brace counting skips quoted text and backslash escapes so script bodies
/// can be carried through untouched.
pub fn split_stanzas(text: &str) -> Result<Vec<RawStanza>, ParseError> {
    let mut out = Vec::new();
    let mut current: Option<(RawStanza, usize)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();

        let Some((mut stanza, depth)) = current.take() else {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            current = open_stanza(trimmed, line_no, &mut out)?;
            continue;
        };

        let scan = scan_braces(line);
        let next = depth as isize + scan.opens as isize - scan.closes as isize;
        if depth as isize + scan.min_depth < 0 {
            return Err(ParseError::Unbalanced {
                section: stanza.header_text(),
                line: line_no,
                text: line.trim().to_string(),
                reason: "unexpected closing brace".to_string(),
            });
        }
        if next == 0 {
            let before_close = scan
                .last_close
                .map_or(line, |pos| &line[..pos])
                .trim_end();
            if !before_close.trim().is_empty() {
                stanza.body.push((line_no, before_close.to_string()));
            }
            out.push(stanza);
            continue;
        }
        stanza.body.push((line_no, line.to_string()));
        current = Some((stanza, next as usize));
    }

    if let Some((stanza, _)) = current {
        return Err(ParseError::Unbalanced {
            section: stanza.header_text(),
            line: stanza.line,
            text: stanza.header_text(),
            reason: "missing closing brace".to_string(),
        });
    }

    Ok(out)
}

fn open_stanza(
    trimmed: &str,
    line_no: usize,
    out: &mut Vec<RawStanza>,
) -> Result<Option<(RawStanza, usize)>, ParseError> {
    let scan = scan_braces(trimmed);
    let Some(open) = scan.first_open else {
        if scan.closes > 0 {
            return Err(ParseError::Unbalanced {
                section: String::new(),
                line: line_no,
                text: trimmed.to_string(),
                reason: "closing brace outside any declaration".to_string(),
            });
        }
        return Err(ParseError::ExpectedDeclaration {
            line: line_no,
            text: trimmed.to_string(),
        });
    };

    let header_text = trimmed[..open].trim();
    if scan.min_depth < 0 {
        let before_close = scan.first_close.map_or(header_text, |pos| trimmed[..pos].trim());
        return Err(ParseError::Unbalanced {
            section: before_close.to_string(),
            line: line_no,
            text: trimmed.to_string(),
            reason: "closing brace before the opening brace".to_string(),
        });
    }
    if header_text.is_empty() {
        return Err(ParseError::ExpectedDeclaration {
            line: line_no,
            text: trimmed.to_string(),
        });
    }
    let header = tokenize(header_text).ok_or_else(|| ParseError::UnterminatedQuote {
        section: header_text.to_string(),
        line: line_no,
        text: trimmed.to_string(),
    })?;

    let mut stanza = RawStanza {
        header,
        line: line_no,
        body: Vec::new(),
    };

    if scan.closes > scan.opens {
        return Err(ParseError::Unbalanced {
            section: stanza.header_text(),
            line: line_no,
            text: trimmed.to_string(),
            reason: "unexpected closing brace".to_string(),
        });
    }

    let depth = scan.opens - scan.closes;
    if depth == 0 {
        // Inline declaration: `header { ... }` on a single line.
        let close = scan.last_close.unwrap_or(trimmed.len());
        let inner = trimmed[open + 1..close].trim();
        if !inner.is_empty() {
            stanza.body.push((line_no, inner.to_string()));
        }
        out.push(stanza);
        return Ok(None);
    }

    let rest = trimmed[open + 1..].trim();
    if !rest.is_empty() {
        stanza.body.push((line_no, rest.to_string()));
    }
    Ok(Some((stanza, depth)))
}

#[derive(Debug, Default)]
struct BraceScan {
    opens: usize,
    closes: usize,
    first_open: Option<usize>,
    first_close: Option<usize>,
    last_close: Option<usize>,
    /// Lowest running depth relative to the start of the line.
    min_depth: isize,
}

fn scan_braces(line: &str) -> BraceScan {
    let mut scan = BraceScan::default();
    let mut in_quote = false;
    let mut escaped = false;
    let mut depth: isize = 0;

    for (pos, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quote = !in_quote,
            '{' if !in_quote => {
                scan.opens += 1;
                depth += 1;
                scan.first_open.get_or_insert(pos);
            }
            '}' if !in_quote => {
                scan.closes += 1;
                depth -= 1;
                scan.min_depth = scan.min_depth.min(depth);
                scan.first_close.get_or_insert(pos);
                scan.last_close = Some(pos);
            }
            _ => {}
        }
    }
    scan
}

/// Split a line into whitespace-separated tokens, keeping quoted text
/// (quotes included) as one token. Returns `None` for an unterminated quote.
pub fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quote = !in_quote;
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quote {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Some(tokens)
}

enum Entry {
    Bare(String, usize),
    Field(String, FieldValue, usize),
}

struct Frame {
    key: String,
    entries: Vec<Entry>,
    line: usize,
}

/// Parse the body of a stanza into an ordered field block.
pub fn parse_fields(raw: &RawStanza, dialect: &Dialect) -> Result<Fields, ParseError> {
    let section = raw.header_text();
    let mut stack = vec![Frame {
        key: String::new(),
        entries: Vec::new(),
        line: raw.line,
    }];

    for (line_no, text) in &raw.body {
        let line_no = *line_no;
        let tokens = tokenize(text).ok_or_else(|| ParseError::UnterminatedQuote {
            section: section.clone(),
            line: line_no,
            text: text.trim().to_string(),
        })?;

        for tokens in logical_lines(tokens) {
            let opens = tokens.iter().filter(|t| t.as_str() == "{").count();
            let closes = tokens.iter().filter(|t| t.as_str() == "}").count();
            let unbalanced = |reason: &str| ParseError::Unbalanced {
                section: section.clone(),
                line: line_no,
                text: text.trim().to_string(),
                reason: reason.to_string(),
            };

            if tokens.len() == 1 && closes == 1 {
                if stack.len() == 1 {
                    return Err(unbalanced("unexpected closing brace"));
                }
                let Frame { key, entries, line } = stack
                    .pop()
                    .ok_or_else(|| unbalanced("unexpected closing brace"))?;
                let value = finish_frame(&key, entries, dialect, &section)?;
                if let Some(parent) = stack.last_mut() {
                    parent.entries.push(Entry::Field(key, value, line));
                }
                continue;
            }

            if opens == 1 && closes == 0 && tokens.last().map(String::as_str) == Some("{") {
                let key = tokens[..tokens.len() - 1].join(" ");
                if key.is_empty() {
                    return Err(unbalanced("block without a name"));
                }
                stack.push(Frame {
                    key,
                    entries: Vec::new(),
                    line: line_no,
                });
                continue;
            }

            if opens != closes {
                return Err(unbalanced("braces do not balance on this line"));
            }
            if tokens[0] == "{" || tokens[0] == "}" {
                return Err(unbalanced("value without a field name"));
            }

            let key = tokens[0].clone();
            let rest = &tokens[1..];
            let entry = if rest.is_empty() {
                Entry::Bare(key, line_no)
            } else if opens == 1
                && rest.first().map(String::as_str) == Some("{")
                && rest.last().map(String::as_str) == Some("}")
            {
                let inner = &rest[1..rest.len() - 1];
                let value = if inner.is_empty() {
                    FieldValue::Block(Fields::new())
                } else {
                    list_value(&key, inner.to_vec(), dialect)
                };
                Entry::Field(key, value, line_no)
            } else {
                let value = scalar_value(&key, rest.join(" "), dialect);
                Entry::Field(key, value, line_no)
            };

            if let Some(frame) = stack.last_mut() {
                frame.entries.push(entry);
            }
        }
    }

    if stack.len() > 1 {
        let open = stack.last().map_or(raw.line, |frame| frame.line);
        let key = stack.last().map(|frame| frame.key.clone()).unwrap_or_default();
        return Err(ParseError::Unbalanced {
            section,
            line: open,
            text: key,
            reason: "missing closing brace".to_string(),
        });
    }

    let root = stack.pop().map(|frame| frame.entries).unwrap_or_default();
    collect_fields(root, &section)
}

/// Break one line's tokens at its braces so nested inline blocks such as
/// `members { /Common/a:80 { } }` go through the frame stack. A brace pair
/// with no brace inside stays on one logical line (`key { a b }`).
fn logical_lines(tokens: Vec<String>) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut idx = 0;

    while idx < tokens.len() {
        match tokens[idx].as_str() {
            "{" => {
                let next_brace = tokens[idx + 1..]
                    .iter()
                    .position(|t| t == "{" || t == "}")
                    .map(|offset| idx + 1 + offset);
                match next_brace {
                    Some(close) if tokens[close] == "}" => {
                        current.extend_from_slice(&tokens[idx..=close]);
                        lines.push(std::mem::take(&mut current));
                        idx = close + 1;
                        continue;
                    }
                    _ => {
                        current.push(tokens[idx].clone());
                        lines.push(std::mem::take(&mut current));
                    }
                }
            }
            "}" => {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(vec![tokens[idx].clone()]);
            }
            _ => current.push(tokens[idx].clone()),
        }
        idx += 1;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn finish_frame(
    key: &str,
    entries: Vec<Entry>,
    dialect: &Dialect,
    section: &str,
) -> Result<FieldValue, ParseError> {
    let all_bare = !entries.is_empty()
        && entries
            .iter()
            .all(|entry| matches!(entry, Entry::Bare(..)));

    if all_bare {
        let items = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Bare(token, _) => Some(token),
                Entry::Field(..) => None,
            })
            .collect();
        return Ok(list_value(key, items, dialect));
    }

    Ok(FieldValue::Block(collect_fields(entries, section)?))
}

fn collect_fields(entries: Vec<Entry>, section: &str) -> Result<Fields, ParseError> {
    let mut fields = Fields::new();
    for entry in entries {
        let (name, value, line) = match entry {
            Entry::Bare(name, line) => (name, FieldValue::Flag, line),
            Entry::Field(name, value, line) => (name, value, line),
        };
        if fields.contains(&name) {
            return Err(ParseError::DuplicateField {
                section: section.to_string(),
                field: name,
                line,
            });
        }
        fields.insert(name, value);
    }
    Ok(fields)
}

fn list_value(key: &str, items: Vec<String>, dialect: &Dialect) -> FieldValue {
    if dialect.is_unordered(key) {
        FieldValue::set(items)
    } else {
        FieldValue::List(items)
    }
}

fn scalar_value(key: &str, text: String, dialect: &Dialect) -> FieldValue {
    if dialect.is_unordered(key) {
        return FieldValue::set(text.split_whitespace().map(ToString::to_string));
    }
    if let Some(separator) = dialect.separator(key) {
        let items = text
            .split(separator)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect();
        return FieldValue::List(items);
    }
    FieldValue::Scalar(text)
}
