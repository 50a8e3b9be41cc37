use crate::dom::escape_html;
use crate::model::Row;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Unterminated { offset: usize },
    EmptyKey { offset: usize },
    InvalidKey { offset: usize, key: String },
    UnsupportedCode { offset: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Unterminated { offset } => {
                write!(f, "unterminated template tag at byte {offset}")
            }
            TemplateError::EmptyKey { offset } => write!(f, "empty template key at byte {offset}"),
            TemplateError::InvalidKey { offset, key } => {
                write!(f, "invalid template key {key:?} at byte {offset}")
            }
            TemplateError::UnsupportedCode { offset } => {
                write!(f, "evaluation blocks are not supported (byte {offset})")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Raw(Vec<String>),
    Escaped(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTemplate {
    segments: Vec<Segment>,
}

impl RowTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0usize;

        while let Some(open) = rest.find("<%") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let tag_offset = offset + open;
            let after_open = &rest[open + 2..];
            let escaped = match after_open.chars().next() {
                Some('=') => false,
                Some('-') => true,
                _ => return Err(TemplateError::UnsupportedCode { offset: tag_offset }),
            };
            let body = &after_open[1..];
            let close = body
                .find("%>")
                .ok_or(TemplateError::Unterminated { offset: tag_offset })?;
            let key = body[..close].trim();
            let path = parse_key(key, tag_offset)?;
            segments.push(if escaped {
                Segment::Escaped(path)
            } else {
                Segment::Raw(path)
            });

            let consumed = open + 3 + close + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Renders one row. Missing keys and `null` render as empty text.
    pub fn render(&self, row: &Row) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Raw(path) => out.push_str(&lookup(row, path)),
                Segment::Escaped(path) => out.push_str(&escape_html(&lookup(row, path))),
            }
        }
        out
    }

    /// Keys referenced by the template, in order of appearance.
    pub fn keys(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Raw(path) | Segment::Escaped(path) => Some(path.join(".")),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

fn parse_key(key: &str, offset: usize) -> Result<Vec<String>, TemplateError> {
    if key.is_empty() {
        return Err(TemplateError::EmptyKey { offset });
    }
    let path: Vec<String> = key.split('.').map(str::to_string).collect();
    let valid = path.iter().all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    });
    if !valid {
        return Err(TemplateError::InvalidKey {
            offset,
            key: key.to_string(),
        });
    }
    Ok(path)
}

fn lookup(row: &Row, path: &[String]) -> String {
    let Some((first, rest)) = path.split_first() else {
        return String::new();
    };
    let mut value = row.get(first);
    for part in rest {
        value = value.and_then(|inner| inner.get(part));
    }
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
