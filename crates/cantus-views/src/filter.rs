//! Filter declarations and argument binding.

use chrono::NaiveDate;

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Rendered value equals the operand text.
    Equals,
    /// Rendered value is one of the operand texts.
    OneOf,
    /// Space-joined field text contains the operand, ignoring case.
    Contains,
    /// Field has a non-empty value.
    NotEmpty,
    /// Field has no non-empty value.
    Empty,
    /// Integer value lies within the inclusive operand range.
    Range,
}

/// Value a filter compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Text(String),
    List(Vec<String>),
    /// Inclusive bounds; a missing bound is open.
    Range { min: Option<i64>, max: Option<i64> },
}

/// Where a bound filter takes its argument from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentSource {
    /// Positional argument, counted from 1.
    Positional(usize),
    /// Named argument of an exposed filter.
    Named(String),
}

/// Expected shape of an argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgumentFormat {
    /// Any non-empty text.
    #[default]
    Text,
    /// An integer.
    Numeric,
    /// A calendar day as `CCYYMMDD`, matching the whole day in UTC.
    FullDate,
}

/// What happens when an argument fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailPolicy {
    /// Drop the filter and widen the result.
    #[default]
    Drop,
    /// Fail the request.
    Reject,
}

/// Binds a filter's operand to a caller argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    pub source: ArgumentSource,
    pub format: ArgumentFormat,
    pub on_invalid: FailPolicy,
}

impl ArgumentBinding {
    pub fn positional(position: usize, format: ArgumentFormat) -> Self {
        Self {
            source: ArgumentSource::Positional(position),
            format,
            on_invalid: FailPolicy::Drop,
        }
    }

    pub fn named(name: impl Into<String>, format: ArgumentFormat) -> Self {
        Self {
            source: ArgumentSource::Named(name.into()),
            format,
            on_invalid: FailPolicy::Drop,
        }
    }
}

/// One input of a grouped exposed filter.
///
/// The caller passes `id`; the filter then applies `operator` with the
/// fixed `operand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChoice {
    pub id: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl FilterChoice {
    pub fn new(id: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self {
            id: id.into(),
            operator,
            operand,
        }
    }
}

const SECONDS_PER_DAY: i64 = 86_400;

impl ArgumentFormat {
    /// Validate `raw` and turn it into an operand for `operator`.
    ///
    /// Returns the reason on failure.
    pub fn parse(self, raw: &str, operator: Operator) -> Result<Operand, String> {
        let raw = raw.trim();
        match self {
            Self::Text => match operator {
                Operator::Range => parse_integer(raw).map(|n| Operand::Range {
                    min: Some(n),
                    max: Some(n),
                }),
                Operator::OneOf => Ok(Operand::List(split_list(raw))),
                _ => Ok(Operand::Text(raw.to_string())),
            },
            Self::Numeric => {
                let n = parse_integer(raw)?;
                Ok(match operator {
                    Operator::Range => Operand::Range {
                        min: Some(n),
                        max: Some(n),
                    },
                    Operator::OneOf => Operand::List(vec![n.to_string()]),
                    _ => Operand::Text(n.to_string()),
                })
            }
            Self::FullDate => {
                let (start, end) = parse_full_date(raw)?;
                Ok(Operand::Range {
                    min: Some(start),
                    max: Some(end),
                })
            }
        }
    }
}

fn parse_integer(raw: &str) -> Result<i64, String> {
    raw.parse::<i64>().map_err(|_| "not a number".to_string())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unix seconds of the first and last second of a `CCYYMMDD` day.
pub fn parse_full_date(raw: &str) -> Result<(i64, i64), String> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err("expected a date as CCYYMMDD".to_string());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|e| e.to_string())?;
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| "date out of range".to_string())?
        .and_utc()
        .timestamp();
    Ok((start, start + SECONDS_PER_DAY - 1))
}

/// A filter of an export definition.
///
/// Filters without a group must all hold. Filters sharing a group are
/// combined so that any one of them may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    id: String,
    fields: Vec<String>,
    operator: Operator,
    operand: Operand,
    argument: Option<ArgumentBinding>,
    exposed: bool,
    group: Option<u32>,
    choices: Vec<FilterChoice>,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        let field = field.into();
        Self {
            id: field.clone(),
            fields: vec![field],
            operator,
            operand,
            argument: None,
            exposed: false,
            group: None,
            choices: Vec::new(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Equals, Operand::Text(value.into()))
    }

    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(field, Operator::OneOf, Operand::List(values))
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, Operator::Contains, Operand::Text(text.into()))
    }

    pub fn not_empty(field: impl Into<String>) -> Self {
        Self::new(field, Operator::NotEmpty, Operand::None)
    }

    pub fn range(field: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(field, Operator::Range, Operand::Range { min, max })
    }

    /// Exposed free-text search over several fields, read from the named
    /// argument `identifier`.
    pub fn combine<I, S>(identifier: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: identifier.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            operator: Operator::Contains,
            operand: Operand::None,
            argument: Some(ArgumentBinding::named(identifier, ArgumentFormat::Text)),
            exposed: true,
            group: None,
            choices: Vec::new(),
        }
    }

    /// Day filter on a timestamp field, read from positional argument
    /// `position` as `CCYYMMDD`.
    pub fn full_date(field: impl Into<String>, position: usize) -> Self {
        let field = field.into();
        Self {
            id: format!("{field}_fulldate"),
            fields: vec![field],
            operator: Operator::Range,
            operand: Operand::None,
            argument: Some(ArgumentBinding::positional(position, ArgumentFormat::FullDate)),
            exposed: false,
            group: None,
            choices: Vec::new(),
        }
    }

    /// Exposed filter on `field` whose named argument `identifier` selects
    /// one of `choices` by id.
    pub fn grouped<I>(field: impl Into<String>, identifier: &str, choices: I) -> Self
    where
        I: IntoIterator<Item = FilterChoice>,
    {
        Self {
            id: identifier.to_string(),
            fields: vec![field.into()],
            operator: Operator::Equals,
            operand: Operand::None,
            argument: Some(ArgumentBinding::named(identifier, ArgumentFormat::Text)),
            exposed: true,
            group: None,
            choices: choices.into_iter().collect(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn argument(mut self, binding: ArgumentBinding) -> Self {
        self.argument = Some(binding);
        self
    }

    pub fn exposed(mut self) -> Self {
        self.exposed = true;
        self
    }

    pub fn group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// Reject invalid arguments instead of dropping the filter.
    ///
    /// No effect on filters without an argument.
    pub fn strict(mut self) -> Self {
        if let Some(binding) = self.argument.as_mut() {
            binding.on_invalid = FailPolicy::Reject;
        }
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[inline]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[inline]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    #[inline]
    pub fn binding(&self) -> Option<&ArgumentBinding> {
        self.argument.as_ref()
    }

    #[inline]
    pub fn is_exposed(&self) -> bool {
        self.exposed
    }

    #[inline]
    pub fn group_id(&self) -> Option<u32> {
        self.group
    }

    /// Selectable inputs; empty unless built with [`FilterSpec::grouped`].
    #[inline]
    pub fn choices(&self) -> &[FilterChoice] {
        &self.choices
    }

    pub fn choice(&self, id: &str) -> Option<&FilterChoice> {
        self.choices.iter().find(|c| c.id == id)
    }
}
