//! Query requests built from export definitions.
//!
//! A [`QueryBuilder`] turns declared filters plus caller arguments into a
//! [`QueryRequest`]. Filters bound to an argument that is missing or fails
//! validation are dropped, which widens the result; strict filters fail the
//! build instead.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use cantus_common::{Record, Value};

use crate::args::ContextArgs;
use crate::filter::{FailPolicy, FilterSpec, Operand, Operator};
use crate::{Error, Result};

/// A resolved filter ready to test records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub fields: Vec<String>,
    pub operator: Operator,
    pub operand: Operand,
}

impl Condition {
    /// Test a record. Missing fields count as empty; list values match if
    /// any item does.
    pub fn matches(&self, record: &Record) -> bool {
        let values = || {
            self.fields
                .iter()
                .filter_map(|f| record.get(f))
                .flat_map(|v| v.items())
        };

        match (self.operator, &self.operand) {
            (Operator::Equals, Operand::Text(expected)) => {
                values().any(|v| v.render() == expected.as_str())
            }
            (Operator::Equals | Operator::OneOf, Operand::List(options)) => {
                values().any(|v| options.iter().any(|o| v.render() == o.as_str()))
            }
            (Operator::OneOf, Operand::Text(expected)) => {
                values().any(|v| v.render() == expected.as_str())
            }
            (Operator::Contains, Operand::Text(needle)) => {
                let haystack = self
                    .fields
                    .iter()
                    .map(|f| record.get_text(f))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                haystack.contains(&needle.to_lowercase())
            }
            (Operator::NotEmpty, _) => values().any(|v| !v.is_empty()),
            (Operator::Empty, _) => values().all(Value::is_empty),
            (Operator::Range, Operand::Range { min, max }) => values()
                .filter_map(Value::as_i64)
                .any(|n| min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m)),
            _ => false,
        }
    }
}

/// Boolean combination of conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every child holds; empty holds for everything.
    All(Vec<Predicate>),
    /// At least one child holds.
    Any(Vec<Predicate>),
    Condition(Condition),
}

impl Predicate {
    /// Predicate accepting every record.
    pub fn always() -> Self {
        Self::All(Vec::new())
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All(children) => children.iter().all(|p| p.matches(record)),
            Self::Any(children) => children.iter().any(|p| p.matches(record)),
            Self::Condition(c) => c.matches(record),
        }
    }

    /// Number of leaf conditions.
    pub fn condition_count(&self) -> usize {
        match self {
            Self::All(children) | Self::Any(children) => {
                children.iter().map(Predicate::condition_count).sum()
            }
            Self::Condition(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Compare two records on this key.
    ///
    /// Integers compare numerically, text case-insensitively. Missing or
    /// empty values sort first when ascending.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_empty());
    let b = b.filter(|v| !v.is_empty());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
            _ => a.render().to_lowercase().cmp(&b.render().to_lowercase()),
        },
    }
}

/// Which slice of the result to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pager {
    Unbounded { offset: usize },
    Limited { items_per_page: usize, offset: usize },
}

impl Default for Pager {
    fn default() -> Self {
        Self::Unbounded { offset: 0 }
    }
}

impl Pager {
    /// Every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// At most `items_per_page` records.
    pub fn limited(items_per_page: usize) -> Self {
        Self::Limited {
            items_per_page,
            offset: 0,
        }
    }

    pub fn with_offset(self, offset: usize) -> Self {
        match self {
            Self::Unbounded { .. } => Self::Unbounded { offset },
            Self::Limited { items_per_page, .. } => Self::Limited {
                items_per_page,
                offset,
            },
        }
    }

    pub fn offset(&self) -> usize {
        match *self {
            Self::Unbounded { offset } | Self::Limited { offset, .. } => offset,
        }
    }

    pub fn page_size(&self) -> Option<usize> {
        match *self {
            Self::Unbounded { .. } => None,
            Self::Limited { items_per_page, .. } => Some(items_per_page),
        }
    }
}

/// A fully resolved query against one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub entity_type: String,
    pub predicate: Predicate,
    pub sort: Vec<SortKey>,
    pub page_size: Option<usize>,
    pub offset: usize,
}

impl QueryRequest {
    /// Request for every record of `entity_type`.
    pub fn all(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            predicate: Predicate::always(),
            sort: Vec::new(),
            page_size: None,
            offset: 0,
        }
    }

    /// Whether a record belongs in the result, ignoring paging.
    pub fn accepts(&self, record: &Record) -> bool {
        record.entity_type() == self.entity_type && self.predicate.matches(record)
    }

    /// Order two records by the request's sort keys, first key first.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.sort
            .iter()
            .map(|key| key.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Evaluate the request over in-memory records: filter, sort, then
    /// page. Ties keep their input order.
    pub fn select<'r, I>(&self, records: I) -> Vec<&'r Record>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let mut matched: Vec<&Record> = records.into_iter().filter(|r| self.accepts(r)).collect();
        if !self.sort.is_empty() {
            matched.sort_by(|a, b| self.compare(a, b));
        }

        let page = matched.into_iter().skip(self.offset);
        match self.page_size {
            Some(n) => page.take(n).collect(),
            None => page.collect(),
        }
    }
}

/// Builder for query requests.
///
/// # Example
///
/// ```
/// use cantus_views::{ContextArgs, FilterSpec, QueryBuilder, SortKey};
///
/// let status = FilterSpec::equals("status", "1");
/// let day = FilterSpec::full_date("changed", 1);
///
/// let request = QueryBuilder::new("chant")
///     .filter(&status)
///     .filter(&day)
///     .sort(SortKey::ascending("nid"))
///     .build(&ContextArgs::positional(["notadate"]))?;
///
/// // the invalid date drops its filter
/// assert_eq!(request.predicate.condition_count(), 1);
/// # Ok::<(), cantus_views::Error>(())
/// ```
pub struct QueryBuilder<'a> {
    entity_type: &'a str,
    filters: Vec<&'a FilterSpec>,
    sort: Vec<SortKey>,
    pager: Pager,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(entity_type: &'a str) -> Self {
        Self {
            entity_type,
            filters: Vec::new(),
            sort: Vec::new(),
            pager: Pager::default(),
        }
    }

    pub fn filter(mut self, filter: &'a FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = &'a FilterSpec>,
    {
        self.filters.extend(filters);
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn sorts<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = SortKey>,
    {
        self.sort.extend(keys);
        self
    }

    pub fn pager(mut self, pager: Pager) -> Self {
        self.pager = pager;
        self
    }

    /// Resolve argument-bound filters against `args` and build the request.
    ///
    /// Ungrouped conditions come first in declared order, followed by one
    /// disjunction per group in ascending group order.
    pub fn build(self, args: &ContextArgs) -> Result<QueryRequest> {
        let mut all = Vec::new();
        let mut groups: BTreeMap<u32, Vec<Predicate>> = BTreeMap::new();

        for filter in &self.filters {
            let Some(condition) = resolve(filter, args)? else {
                continue;
            };
            let predicate = Predicate::Condition(condition);
            match filter.group_id() {
                Some(group) => groups.entry(group).or_default().push(predicate),
                None => all.push(predicate),
            }
        }

        for (_, mut members) in groups {
            all.push(if members.len() == 1 {
                members.remove(0)
            } else {
                Predicate::Any(members)
            });
        }

        Ok(QueryRequest {
            entity_type: self.entity_type.to_string(),
            predicate: Predicate::All(all),
            sort: self.sort,
            page_size: self.pager.page_size(),
            offset: self.pager.offset(),
        })
    }
}

/// Turn a filter into a condition, `None` when it does not apply.
fn resolve(filter: &FilterSpec, args: &ContextArgs) -> Result<Option<Condition>> {
    let condition = |operator, operand| Condition {
        fields: filter.fields().to_vec(),
        operator,
        operand,
    };

    let Some(binding) = filter.binding() else {
        return Ok(Some(condition(filter.operator(), filter.operand().clone())));
    };

    let raw = match args.get(&binding.source) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => {
            tracing::debug!(filter = filter.id(), "no argument, filter not applied");
            return Ok(None);
        }
    };

    let parsed = if filter.choices().is_empty() {
        binding
            .format
            .parse(raw, filter.operator())
            .map(|operand| condition(filter.operator(), operand))
    } else {
        filter
            .choice(raw.trim())
            .map(|c| condition(c.operator, c.operand.clone()))
            .ok_or_else(|| "no such choice".to_string())
    };

    match parsed {
        Ok(condition) => Ok(Some(condition)),
        Err(reason) => match binding.on_invalid {
            FailPolicy::Drop => {
                tracing::warn!(
                    filter = filter.id(),
                    value = raw,
                    %reason,
                    "invalid argument, filter dropped"
                );
                Ok(None)
            }
            FailPolicy::Reject => Err(Error::InvalidArgument {
                filter: filter.id().to_string(),
                value: raw.to_string(),
                reason,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ArgumentBinding;
    use crate::filter::ArgumentFormat;
    use crate::filter::FilterChoice;

    fn chant(id: u64, changed: i64, status: i64) -> Record {
        Record::new("chant", id)
            .with("nid", id as i64)
            .with("changed", changed)
            .with("status", status)
            .with("type", "chant")
    }

    fn chant_filters() -> Vec<FilterSpec> {
        vec![
            FilterSpec::equals("status", "1"),
            FilterSpec::equals("type", "chant"),
            FilterSpec::full_date("changed", 1),
        ]
    }

    fn records() -> Vec<Record> {
        vec![
            chant(1, 1_672_531_200, 1), // 2023-01-01 00:00:00
            chant(2, 1_672_617_599, 1), // 2023-01-01 23:59:59
            chant(3, 1_672_617_600, 1), // 2023-01-02
            chant(4, 1_672_540_000, 0), // unpublished
        ]
    }

    fn select_ids(request: &QueryRequest, records: &[Record]) -> Vec<u64> {
        request.select(records).into_iter().map(Record::id).collect()
    }

    #[test]
    fn test_valid_date_applies_range() {
        let filters = chant_filters();
        let request = QueryBuilder::new("chant")
            .filters(&filters)
            .build(&ContextArgs::positional(["20230101"]))
            .unwrap();
        assert_eq!(request.predicate.condition_count(), 3);
        assert_eq!(select_ids(&request, &records()), [1, 2]);
    }

    #[test]
    fn test_invalid_date_fails_open() {
        let filters = chant_filters();
        let request = QueryBuilder::new("chant")
            .filters(&filters)
            .build(&ContextArgs::positional(["notadate"]))
            .unwrap();
        assert_eq!(request.predicate.condition_count(), 2);
        assert_eq!(select_ids(&request, &records()), [1, 2, 3]);
    }

    #[test]
    fn test_missing_argument_drops_filter() {
        let filters = chant_filters();
        let request = QueryBuilder::new("chant")
            .filters(&filters)
            .build(&ContextArgs::new())
            .unwrap();
        assert_eq!(request.predicate.condition_count(), 2);
    }

    #[test]
    fn test_strict_filter_rejects() {
        let filter = FilterSpec::full_date("changed", 1).strict();
        let err = QueryBuilder::new("chant")
            .filter(&filter)
            .build(&ContextArgs::positional(["notadate"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(err.kind(), cantus_common::ErrorKind::Validation);
    }

    #[test]
    fn test_groups_are_disjunctions() {
        let a = FilterSpec::equals("nid", "1").group(1);
        let b = FilterSpec::equals("nid", "3").group(1);
        let status = FilterSpec::equals("status", "1");
        let request = QueryBuilder::new("chant")
            .filter(&a)
            .filter(&status)
            .filter(&b)
            .build(&ContextArgs::new())
            .unwrap();
        assert_eq!(select_ids(&request, &records()), [1, 3]);
    }

    #[test]
    fn test_contains_over_fields() {
        let filter = FilterSpec::combine("combine", ["name", "description"]);
        let request = QueryBuilder::new("feast")
            .filter(&filter)
            .build(&ContextArgs::new().with_named("combine", "NATIVITY"))
            .unwrap();

        let hit = Record::new("feast", 1)
            .with("name", "Christmas")
            .with("description", "Nativity of the Lord");
        let miss = Record::new("feast", 2).with("name", "Easter");
        assert_eq!(select_ids(&request, &[hit, miss]), [1]);
    }

    #[test]
    fn test_sort_and_page() {
        let request = QueryBuilder::new("sigla")
            .sort(SortKey::ascending("siglum"))
            .sort(SortKey::descending("title"))
            .pager(Pager::limited(2).with_offset(1))
            .build(&ContextArgs::new())
            .unwrap();

        let record = |id, siglum: &str, title: &str| {
            Record::new("sigla", id)
                .with("siglum", siglum)
                .with("title", title)
        };
        let records = [
            record(1, "B-Br", "a"),
            record(2, "a-wn", "x"),
            record(3, "A-Wn", "y"),
            record(4, "", "z"),
        ];
        // empty first, then the two Wn sigla by title descending, then B-Br
        assert_eq!(select_ids(&request, &records), [3, 2]);
    }

    #[test]
    fn test_named_numeric_argument() {
        let filter = FilterSpec::new("vid", Operator::Equals, Operand::None)
            .argument(ArgumentBinding::named("vid", ArgumentFormat::Numeric));
        let request = QueryBuilder::new("feast")
            .filter(&filter)
            .build(&ContextArgs::new().with_named("vid", "7"))
            .unwrap();
        let record = Record::new("feast", 1).with("vid", 7i64);
        assert!(request.accepts(&record));
    }

    #[test]
    fn test_list_values_match_any_item() {
        let condition = Condition {
            fields: vec!["office".into()],
            operator: Operator::OneOf,
            operand: Operand::List(vec!["V".into()]),
        };
        let record = Record::new("chant", 1).with("office", vec!["M", "V"]);
        assert!(condition.matches(&record));
        assert!(!condition.matches(&Record::new("chant", 2)));
    }

    #[test]
    fn test_not_empty_with_empty_list_items() {
        let filter = FilterSpec::not_empty("notes");
        let request = QueryBuilder::new("chant")
            .filter(&filter)
            .build(&ContextArgs::new())
            .unwrap();
        let records = [
            Record::new("chant", 1).with("notes", vec!["", ""]),
            Record::new("chant", 2).with("notes", vec!["", "melisma"]),
            Record::new("chant", 3).with("notes", Vec::<String>::new()),
            Record::new("chant", 4),
        ];
        assert_eq!(select_ids(&request, &records), [2]);
    }

    #[test]
    fn test_static_open_range() {
        let notes = FilterSpec::not_empty("notes");
        let from_two = FilterSpec::range("nid", Some(2), None);
        let request = QueryBuilder::new("chant")
            .filter(&notes)
            .filter(&from_two)
            .build(&ContextArgs::new())
            .unwrap();
        let records = [
            chant(1, 0, 1).with("notes", "n"),
            chant(2, 0, 1),
            chant(3, 0, 1).with("notes", "n"),
            chant(4, 0, 1).with("notes", "n"),
        ];
        assert_eq!(select_ids(&request, &records), [3, 4]);

        let up_to_two = FilterSpec::range("nid", None, Some(2));
        let request = QueryBuilder::new("chant")
            .filter(&up_to_two)
            .build(&ContextArgs::new())
            .unwrap();
        assert_eq!(select_ids(&request, &records), [1, 2]);
    }

    fn feast_date_filter() -> FilterSpec {
        FilterSpec::grouped(
            "date",
            "date_value",
            [
                FilterChoice::new("1", Operator::Empty, Operand::None),
                FilterChoice::new("2", Operator::NotEmpty, Operand::None),
            ],
        )
    }

    fn feasts() -> Vec<Record> {
        vec![
            Record::new("feast", 1).with("month", "11"),
            Record::new("feast", 2).with("date", "1225").with("month", "12"),
        ]
    }

    #[test]
    fn test_grouped_choice_selects_condition() {
        let filter = feast_date_filter();
        let run = |value: &str| {
            let request = QueryBuilder::new("feast")
                .filter(&filter)
                .build(&ContextArgs::new().with_named("date_value", value))
                .unwrap();
            select_ids(&request, &feasts())
        };
        assert_eq!(run("1"), [1]);
        assert_eq!(run("2"), [2]);
        assert_eq!(run(" 2 "), [2]);
        // unknown ids drop the filter
        assert_eq!(run("3"), [1, 2]);
    }

    #[test]
    fn test_grouped_choice_maps_to_operand() {
        // first item is December, the rest follow from January
        let filter = FilterSpec::grouped(
            "month",
            "month_value",
            [12, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    FilterChoice::new(
                        (i + 1).to_string(),
                        Operator::Equals,
                        Operand::Text(m.to_string()),
                    )
                }),
        );
        let run = |value: &str| {
            let request = QueryBuilder::new("feast")
                .filter(&filter)
                .build(&ContextArgs::new().with_named("month_value", value))
                .unwrap();
            select_ids(&request, &feasts())
        };
        assert_eq!(run("12"), [1]);
        assert_eq!(run("1"), [2]);
        assert!(run("2").is_empty());
    }

    #[test]
    fn test_strict_grouped_rejects_unknown_choice() {
        let filter = feast_date_filter().strict();
        let err = QueryBuilder::new("feast")
            .filter(&filter)
            .build(&ContextArgs::new().with_named("date_value", "9"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { ref filter, .. } if filter == "date_value"));
    }

    #[test]
    fn test_empty_operator() {
        let condition = Condition {
            fields: vec!["date".into()],
            operator: Operator::Empty,
            operand: Operand::None,
        };
        assert!(condition.matches(&Record::new("feast", 1)));
        assert!(condition.matches(&Record::new("feast", 2).with("date", "")));
        assert!(condition.matches(&Record::new("feast", 3).with("date", vec!["", ""])));
        assert!(!condition.matches(&Record::new("feast", 4).with("date", "0101")));
    }
}
