//! Field specifications: how one output column is derived from a record.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cantus_common::Record;
use memchr::memchr;

use crate::{Error, Result};

/// Where a field takes its raw value from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourcePath {
    /// A property of the record itself (`title`).
    Property(String),
    /// The target ids of a reference property (`genre.id`).
    ReferenceId(String),
    /// The target labels of a reference property (`genre.label`).
    ReferenceLabel(String),
}

impl SourcePath {
    /// The record property the path starts at.
    pub fn property(&self) -> &str {
        match self {
            Self::Property(p) | Self::ReferenceId(p) | Self::ReferenceLabel(p) => p,
        }
    }

    /// Whether the path dereferences an entity reference.
    pub fn follows_reference(&self) -> bool {
        !matches!(self, Self::Property(_))
    }
}

impl FromStr for SourcePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSourcePath(s.to_string());
        match s.split_once('.') {
            None if !s.is_empty() => Ok(Self::Property(s.to_string())),
            Some((prop, "id")) if !prop.is_empty() => Ok(Self::ReferenceId(prop.to_string())),
            Some((prop, "label")) if !prop.is_empty() => Ok(Self::ReferenceLabel(prop.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(p) => f.write_str(p),
            Self::ReferenceId(p) => write!(f, "{p}.id"),
            Self::ReferenceLabel(p) => write!(f, "{p}.label"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Value,
    Property(String),
}

/// Output template such as `/chant/[value]/` or `[city] - [value]`.
///
/// `[value]` stands for the current field value, any other `[name]` for the
/// rendered record property `name`. Brackets that do not enclose a token name
/// are kept literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse a template.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let parts = parse_template(&source);
        Self { source, parts }
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Record properties the template refers to.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            TemplatePart::Property(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Render with `value` substituted for `[value]`.
    pub fn render(&self, value: &str, record: &Record) -> String {
        let mut out = String::with_capacity(self.source.len() + value.len());
        for part in &self.parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                TemplatePart::Value => out.push_str(value),
                TemplatePart::Property(name) => {
                    if let Some(v) = record.get(name) {
                        out.push_str(&v.render());
                    }
                }
            }
        }
        out
    }
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn parse_template(source: &str) -> Vec<TemplatePart> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;

    while let Some(open) = memchr(b'[', &bytes[pos..]).map(|i| pos + i) {
        let Some(close) = memchr(b']', &bytes[open + 1..]).map(|i| open + 1 + i) else {
            break;
        };
        let name = &source[open + 1..close];
        if !is_token(name) {
            literal.push_str(&source[pos..=open]);
            pos = open + 1;
            continue;
        }

        literal.push_str(&source[pos..open]);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(if name == "value" {
            TemplatePart::Value
        } else {
            TemplatePart::Property(name.to_string())
        });
        pos = close + 1;
    }

    literal.push_str(&source[pos..]);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    parts
}

/// Remove markup tags, keeping their text content.
///
/// A `<` without a closing `>` is kept as text.
pub fn strip_tags(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut pos = 0;

    while let Some(open) = memchr(b'<', &bytes[pos..]).map(|i| pos + i) {
        match memchr(b'>', &bytes[open..]).map(|i| open + i) {
            Some(close) => {
                out.push_str(&input[pos..open]);
                pos = close + 1;
            }
            None => break,
        }
    }
    out.push_str(&input[pos..]);
    out
}

/// A value rewrite applied after extraction.
#[derive(Clone)]
pub enum Transform {
    /// Trim leading and trailing whitespace.
    TrimWhitespace,
    /// Remove markup tags.
    StripTags,
    /// Rewrite through a [`Template`].
    Template(Template),
    /// Caller-supplied rewrite.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Transform {
    /// Apply to `value`; `record` feeds template tokens.
    pub fn apply(&self, value: &str, record: &Record) -> String {
        match self {
            Self::TrimWhitespace => value.trim().to_string(),
            Self::StripTags => strip_tags(value),
            Self::Template(t) => t.render(value, record),
            Self::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrimWhitespace => f.write_str("TrimWhitespace"),
            Self::StripTags => f.write_str("StripTags"),
            Self::Template(t) => f.debug_tuple("Template").field(&t.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One output column of an export.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    source: SourcePath,
    label: String,
    transforms: Vec<Transform>,
    hide_empty: bool,
    encode_entities: bool,
}

impl FieldSpec {
    pub fn new(source: SourcePath, label: impl Into<String>) -> Self {
        Self {
            source,
            label: label.into(),
            transforms: Vec::new(),
            hide_empty: false,
            encode_entities: true,
        }
    }

    /// Parse `path` as a [`SourcePath`] and create the field.
    pub fn parse(path: &str, label: impl Into<String>) -> Result<Self> {
        Ok(Self::new(path.parse()?, label))
    }

    /// Shorthand for a plain property field labelled like the property.
    pub fn property(name: &str) -> Self {
        Self::new(SourcePath::Property(name.to_string()), name)
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn trim(self) -> Self {
        self.transform(Transform::TrimWhitespace)
    }

    pub fn strip_tags(self) -> Self {
        self.transform(Transform::StripTags)
    }

    pub fn template(self, template: &str) -> Self {
        self.transform(Transform::Template(Template::new(template)))
    }

    pub fn custom(self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.transform(Transform::Custom(Arc::new(f)))
    }

    /// Omit the field from a row when its final value is empty.
    pub fn hide_empty(mut self) -> Self {
        self.hide_empty = true;
        self
    }

    /// Emit the value without escaping markup characters.
    pub fn raw(mut self) -> Self {
        self.encode_entities = false;
        self
    }

    #[inline]
    pub fn source(&self) -> &SourcePath {
        &self.source
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    #[inline]
    pub fn hides_empty(&self) -> bool {
        self.hide_empty
    }

    #[inline]
    pub fn encodes_entities(&self) -> bool {
        self.encode_entities
    }

    /// Record properties referenced by templates.
    pub fn template_properties(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().flat_map(|t| match t {
            Transform::Template(t) => t.properties().collect::<Vec<_>>(),
            _ => Vec::new(),
        })
    }

    /// Run the transforms in declared order.
    ///
    /// An empty raw value stays empty so templates do not produce output
    /// for missing data.
    pub fn apply(&self, raw: &str, record: &Record) -> String {
        if raw.is_empty() {
            return String::new();
        }
        self.transforms
            .iter()
            .fold(raw.to_string(), |value, t| t.apply(&value, record))
    }
}
