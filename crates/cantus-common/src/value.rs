//! Attribute values carried by records.

use std::borrow::Cow;
use std::fmt;

/// A reference from one record to another (taxonomy term, node, user).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Entity type of the target, e.g. `feast` or `genre`.
    pub entity_type: String,
    /// Identifier of the target within its entity type.
    pub id: u64,
}

impl EntityRef {
    /// Create a new reference.
    pub fn new(entity_type: impl Into<String>, id: u64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// A single record attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean flag, rendered as `1` or `0`.
    Bool(bool),
    /// Integer, also used for unix timestamps.
    Integer(i64),
    /// Free text, possibly containing markup.
    Text(String),
    /// Reference to another record.
    Reference(EntityRef),
    /// Multi-valued attribute.
    List(Vec<Value>),
}

impl Value {
    /// Whether the value carries no data.
    ///
    /// Lists are empty when every item is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.iter().all(Value::is_empty),
            Self::Bool(_) | Self::Integer(_) | Self::Reference(_) => false,
        }
    }

    /// Render the value as export text.
    ///
    /// References render as their target id; list items are joined with
    /// `", "`, skipping empty items.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(""),
            Self::Bool(true) => Cow::Borrowed("1"),
            Self::Bool(false) => Cow::Borrowed("0"),
            Self::Integer(n) => Cow::Owned(n.to_string()),
            Self::Text(s) => Cow::Borrowed(s),
            Self::Reference(r) => Cow::Owned(r.id.to_string()),
            Self::List(items) => {
                let parts: Vec<_> = items
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| v.render())
                    .collect();
                Cow::Owned(parts.join(", "))
            }
        }
    }

    /// Interpret the value as an integer.
    ///
    /// Text is parsed after trimming; booleans map to 1/0.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Reference(r) => i64::try_from(r.id).ok(),
            Self::Null | Self::List(_) => None,
        }
    }

    /// Return the reference if this is one.
    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Iterate over the scalar items of the value.
    ///
    /// A list yields its items, anything else yields itself once.
    pub fn items(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Self::List(items) => Box::new(items.iter()),
            other => Box::new(std::iter::once(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<EntityRef> for Value {
    fn from(r: EntityRef) -> Self {
        Self::Reference(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::List(vec![Value::Null, Value::from("")]).is_empty());
        assert!(!Value::Integer(0).is_empty());
        assert!(!Value::Bool(false).is_empty());
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Bool(true).render(), "1");
        assert_eq!(Value::Integer(-4).render(), "-4");
        assert_eq!(Value::from(EntityRef::new("feast", 42)).render(), "42");
        let list = Value::List(vec![Value::from("a"), Value::Null, Value::from("b")]);
        assert_eq!(list.render(), "a, b");
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Value::from(" 17 ").as_i64(), Some(17));
        assert_eq!(Value::from("x").as_i64(), None);
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
    }
}
