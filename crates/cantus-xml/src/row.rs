//! Projected rows: the ordered label/value pairs of one exported item.

/// How an entry's text is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Escape `<`, `>` and `&`.
    #[default]
    Escaped,
    /// Write verbatim; the text is already escape-safe or deliberately
    /// contains markup.
    Raw,
}

/// One child element of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Label, before the element-name transform.
    pub label: String,
    /// Text content.
    pub value: String,
    /// Encoding policy for `value`.
    pub encoding: Encoding,
}

/// An ordered mapping of label to text for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    entries: Vec<Entry>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `n` entries.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Append an escaped entry.
    pub fn push(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.push_with(label, value, Encoding::Escaped);
    }

    /// Append a verbatim entry.
    pub fn push_raw(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.push_with(label, value, Encoding::Raw);
    }

    /// Append an entry with an explicit encoding.
    pub fn push_with(&mut self, label: impl Into<String>, value: impl Into<String>, encoding: Encoding) {
        self.entries.push(Entry {
            label: label.into(),
            value: value.into(),
            encoding,
        });
    }

    /// Entries in order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Value of the first entry with the given label.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.value.as_str())
    }

    /// Labels in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// `(label, value)` pairs in order.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.label.as_str(), e.value.as_str()))
            .collect()
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
