//! Caller-supplied arguments for one export run.

use std::collections::BTreeMap;

use crate::filter::ArgumentSource;

/// Positional arguments (path segments) and named arguments (exposed
/// filter inputs) supplied with an export request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextArgs {
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

impl ContextArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments from positional values, first one at position 1.
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    /// Add a named argument.
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Append a positional argument.
    pub fn push(&mut self, value: impl Into<String>) {
        self.positional.push(value.into());
    }

    /// Positional argument `position`, counted from 1.
    pub fn at(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|i| self.positional.get(i))
            .map(String::as_str)
    }

    /// Named argument `name`.
    pub fn named(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Look up the argument a filter is bound to.
    pub fn get(&self, source: &ArgumentSource) -> Option<&str> {
        match source {
            ArgumentSource::Positional(n) => self.at(*n),
            ArgumentSource::Named(name) => self.named(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}
