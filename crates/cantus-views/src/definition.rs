//! Export definitions: what one named export selects and how it is written.

use cantus_xml::{NameTransform, XmlOptions};

use crate::args::ContextArgs;
use crate::field::FieldSpec;
use crate::filter::{ArgumentFormat, ArgumentSource, FilterSpec, Operator};
use crate::query::{Pager, QueryBuilder, QueryRequest, SortKey};
use crate::registry::{validate_field, FieldRegistry};
use crate::{Error, Result};

/// Substituted for a file-name argument that was not supplied.
const MISSING_ARGUMENT: &str = "all";

/// Output file name with argument placeholders.
///
/// `%1`, `%1-value` and `%1-title` insert positional argument 1, `%view`
/// inserts the export id. Inserted text is reduced to a safe file-name
/// component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameTemplate {
    template: String,
}

impl FileNameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Whether the template itself can only produce a plain file name.
    pub fn is_plain(&self) -> bool {
        !self.template.is_empty()
            && !self.template.starts_with('.')
            && !self.template.contains(['/', '\\'])
    }

    /// Expand placeholders for export `view` with `args`.
    pub fn resolve(&self, view: &str, args: &ContextArgs) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            if let Some(after) = rest.strip_prefix("view") {
                out.push_str(&sanitize_component(view));
                rest = after;
                continue;
            }

            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let Ok(position) = rest[..digits].parse::<usize>() else {
                out.push('%');
                continue;
            };
            rest = &rest[digits..];
            for suffix in ["-value", "-title"] {
                if let Some(after) = rest.strip_prefix(suffix) {
                    rest = after;
                    break;
                }
            }

            match args.at(position) {
                Some(value) if !value.is_empty() => out.push_str(&sanitize_component(value)),
                _ => out.push_str(MISSING_ARGUMENT),
            }
        }
        out.push_str(rest);
        out
    }
}

/// Reduce caller text to characters safe inside a file name.
///
/// Keeps ASCII letters, digits, `-`, `_` and `.`; anything else becomes
/// `_`. Leading dots are replaced too, so the result is never `..`.
pub fn sanitize_component(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let dots = out.bytes().take_while(|&b| b == b'.').count();
    out.replace_range(..dots, &"_".repeat(dots));
    out
}

/// A named, fully validated export.
#[derive(Debug, Clone)]
pub struct ExportDefinition {
    id: String,
    entity_type: String,
    description: Option<String>,
    fields: Vec<FieldSpec>,
    filters: Vec<FilterSpec>,
    sort: Vec<SortKey>,
    pager: Pager,
    xml: XmlOptions,
    file_name: FileNameTemplate,
}

impl ExportDefinition {
    pub fn builder(id: impl Into<String>) -> ExportDefinitionBuilder {
        ExportDefinitionBuilder::new(id)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[inline]
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    #[inline]
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    #[inline]
    pub fn pager(&self) -> Pager {
        self.pager
    }

    #[inline]
    pub fn xml_options(&self) -> &XmlOptions {
        &self.xml
    }

    #[inline]
    pub fn file_name_template(&self) -> &FileNameTemplate {
        &self.file_name
    }

    /// Names of the exposed filter inputs.
    pub fn exposed_inputs(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|f| f.is_exposed())
            .filter_map(|f| match f.binding().map(|b| &b.source) {
                Some(ArgumentSource::Named(name)) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Build the query for one request.
    pub fn query(&self, args: &ContextArgs) -> Result<QueryRequest> {
        QueryBuilder::new(&self.entity_type)
            .filters(&self.filters)
            .sorts(self.sort.iter().cloned())
            .pager(self.pager)
            .build(args)
    }

    /// Output file name for one request.
    pub fn file_name(&self, args: &ContextArgs) -> String {
        self.file_name.resolve(&self.id, args)
    }
}

enum FieldSelection {
    Registered(String),
    Inline(FieldSpec),
}

/// Builder for [`ExportDefinition`]; validated against a registry on
/// [`build`](ExportDefinitionBuilder::build).
pub struct ExportDefinitionBuilder {
    id: String,
    entity_type: Option<String>,
    description: Option<String>,
    selection: Vec<FieldSelection>,
    all_fields: bool,
    filters: Vec<FilterSpec>,
    sort: Vec<SortKey>,
    pager: Pager,
    root_tag: Option<String>,
    item_tag: Option<String>,
    name_transform: NameTransform,
    file_name: Option<String>,
}

impl ExportDefinitionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: None,
            description: None,
            selection: Vec::new(),
            all_fields: false,
            filters: Vec::new(),
            sort: Vec::new(),
            pager: Pager::default(),
            root_tag: None,
            item_tag: None,
            name_transform: NameTransform::Identity,
            file_name: None,
        }
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Select a registered field by label.
    pub fn field(mut self, label: impl Into<String>) -> Self {
        self.selection.push(FieldSelection::Registered(label.into()));
        self
    }

    pub fn fields<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection
            .extend(labels.into_iter().map(|l| FieldSelection::Registered(l.into())));
        self
    }

    /// Select every registered field, in registration order, ahead of any
    /// other selected fields.
    pub fn all_fields(mut self) -> Self {
        self.all_fields = true;
        self
    }

    /// Add a field only this export uses.
    pub fn inline_field(mut self, field: FieldSpec) -> Self {
        self.selection.push(FieldSelection::Inline(field));
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn pager(mut self, pager: Pager) -> Self {
        self.pager = pager;
        self
    }

    pub fn root_tag(mut self, tag: impl Into<String>) -> Self {
        self.root_tag = Some(tag.into());
        self
    }

    pub fn item_tag(mut self, tag: impl Into<String>) -> Self {
        self.item_tag = Some(tag.into());
        self
    }

    pub fn name_transform(mut self, transform: NameTransform) -> Self {
        self.name_transform = transform;
        self
    }

    pub fn file_name(mut self, template: impl Into<String>) -> Self {
        self.file_name = Some(template.into());
        self
    }

    /// Resolve fields against `registry` and validate the definition.
    pub fn build(self, registry: &FieldRegistry) -> Result<ExportDefinition> {
        let invalid = |reason: String| Error::InvalidDefinition {
            export: self.id.clone(),
            reason,
        };

        let entity_type = self
            .entity_type
            .clone()
            .ok_or_else(|| invalid("no entity type".into()))?;
        let schema = registry
            .schema(&entity_type)
            .ok_or_else(|| Error::UnknownEntityType(entity_type.clone()))?;

        let mut fields: Vec<FieldSpec> = Vec::new();
        if self.all_fields {
            fields.extend(registry.list_for(&entity_type).iter().cloned());
        }
        for selection in &self.selection {
            let field = match selection {
                FieldSelection::Registered(label) => registry
                    .field(&entity_type, label)
                    .cloned()
                    .ok_or_else(|| Error::UnknownField {
                        entity_type: entity_type.clone(),
                        label: label.clone(),
                    })?,
                FieldSelection::Inline(field) => {
                    validate_field(schema, field)?;
                    field.clone()
                }
            };
            if fields.iter().any(|f| f.label() == field.label()) {
                return Err(Error::DuplicateLabel {
                    scope: format!("export {:?}", self.id),
                    label: field.label().to_string(),
                });
            }
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(invalid("no fields selected".into()));
        }

        for filter in &self.filters {
            if let Some(missing) = filter.fields().iter().find(|f| !schema.has(f)) {
                return Err(invalid(format!(
                    "filter {:?} reads unknown property {missing:?}",
                    filter.id()
                )));
            }
            if let Some(binding) = filter.binding() {
                if binding.source == ArgumentSource::Positional(0) {
                    return Err(invalid(format!(
                        "filter {:?} binds argument 0; positions start at 1",
                        filter.id()
                    )));
                }
                if binding.format == ArgumentFormat::FullDate && filter.operator() != Operator::Range
                {
                    return Err(invalid(format!(
                        "filter {:?} takes a date but is not a range",
                        filter.id()
                    )));
                }
            }
        }
        if let Some(key) = self.sort.iter().find(|k| !schema.has(&k.field)) {
            return Err(invalid(format!("sort on unknown property {:?}", key.field)));
        }

        let xml = XmlOptions::new(
            self.root_tag.clone().unwrap_or_else(|| self.id.clone()),
            self.item_tag.clone().unwrap_or_else(|| entity_type.clone()),
        )
        .with_name_transform(self.name_transform.clone());
        xml.validate()?;

        let mut elements: Vec<(String, &str)> = Vec::with_capacity(fields.len());
        for field in &fields {
            let element = xml.name_transform.apply(field.label());
            if let Some((_, other)) = elements.iter().find(|(e, _)| *e == element) {
                return Err(invalid(format!(
                    "labels {other:?} and {:?} both become element {element:?}",
                    field.label()
                )));
            }
            elements.push((element, field.label()));
        }

        let file_name = FileNameTemplate::new(
            self.file_name
                .clone()
                .unwrap_or_else(|| format!("{}.xml", self.id)),
        );
        if !file_name.is_plain() {
            return Err(invalid(format!(
                "file name {:?} must be a plain file name",
                file_name.as_str()
            )));
        }

        Ok(ExportDefinition {
            id: self.id,
            entity_type,
            description: self.description,
            fields,
            filters: self.filters,
            sort: self.sort,
            pager: self.pager,
            xml,
            file_name,
        })
    }
}
