//! Element-name transforms.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Rule applied to field labels before they become element names.
///
/// The result of every rule is passed through [`encode_xml_name`], so the
/// element name is always legal XML.
#[derive(Clone, Default)]
pub enum NameTransform {
    /// Keep labels as they are.
    #[default]
    Identity,
    /// Spaces and dashes become underscores.
    Underline,
    /// Spaces and underscores become dashes.
    Dash,
    /// `full text` becomes `fullText`.
    Camel,
    /// `full text` becomes `FullText`.
    Pascal,
    /// Caller-supplied rule.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl NameTransform {
    /// Wrap a closure as a custom transform.
    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Transform a label into an element name.
    pub fn apply(&self, label: &str) -> String {
        let transformed = match self {
            Self::Identity => label.to_string(),
            Self::Underline => label.replace([' ', '-'], "_"),
            Self::Dash => label.replace([' ', '_'], "-"),
            Self::Camel => join_words(label, false),
            Self::Pascal => join_words(label, true),
            Self::Custom(f) => f(label),
        };
        encode_xml_name(&transformed)
    }
}

impl fmt::Debug for NameTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Underline => f.write_str("Underline"),
            Self::Dash => f.write_str("Dash"),
            Self::Camel => f.write_str("Camel"),
            Self::Pascal => f.write_str("Pascal"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl FromStr for NameTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "identity" => Ok(Self::Identity),
            "underline" => Ok(Self::Underline),
            "dash" => Ok(Self::Dash),
            "camel" => Ok(Self::Camel),
            "pascal" => Ok(Self::Pascal),
            other => Err(format!("unknown name transform: {other}")),
        }
    }
}

fn join_words(label: &str, capitalize_first: bool) -> String {
    let mut result = String::with_capacity(label.len());
    let words = label.split([' ', '_', '-']).filter(|w| !w.is_empty());

    for (i, word) in words.enumerate() {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 && !capitalize_first {
                result.extend(first.to_lowercase());
            } else {
                result.extend(first.to_uppercase());
            }
            result.push_str(chars.as_str());
        }
    }

    result
}

/// Element name used when a label has no characters at all.
const EMPTY_NAME: &str = "field";

/// Make `name` a legal element name.
///
/// ASCII letters, digits, `_`, `-` and `.` are kept and anything else maps
/// to `_`. A name may not start with a digit or punctuation: a leading digit
/// gains a `_` prefix, other leading characters become `_`.
pub fn encode_xml_name(name: &str) -> String {
    if name.is_empty() {
        return EMPTY_NAME.to_string();
    }

    let mut out = String::with_capacity(name.len() + 1);
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        match first {
            c if c.is_ascii_alphabetic() || c == '_' => out.push(c),
            c if c.is_ascii_digit() => {
                out.push('_');
                out.push(c);
            }
            _ => out.push('_'),
        }
    }
    out.extend(chars.map(|c| match c {
        'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.' => c,
        _ => '_',
    }));
    out
}

/// Whether `name` is already a legal element name as produced by
/// [`encode_xml_name`].
pub fn is_valid_xml_name(name: &str) -> bool {
    !name.is_empty() && encode_xml_name(name) == name
}
