//! Structural payload schemas and document normalization.
//!
//! Workers declare a [`PayloadSchema`]; [`PayloadSchema::document_schema`] wraps it with
//! the common template fields for the worker's fan-out strategy. Normalization checks
//! presence, coerces scalar types, fills defaults and collects every problem into a
//! single [`ValidationErrors`] map keyed by field path.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::core::fanout::FanOutStrategy;
use crate::core::render;

/// Top-level template field names.
pub mod fields {
    /// Template display name.
    pub const TEMPLATE_NAME: &str = "TemplateName";
    /// Template description.
    pub const TEMPLATE_DESCRIPTION: &str = "TemplateDescription";
    /// Inclusion account filter.
    pub const INCLUDE_ACCOUNTS: &str = "IncludeAccounts";
    /// Exclusion account filter.
    pub const EXCLUDE_ACCOUNTS: &str = "ExcludeAccounts";
    /// Org-root opt-in flag.
    pub const OPERATE_IN_ORG_ROOT: &str = "OperateInOrgRoot";
    /// Inclusion region list.
    pub const INCLUDE_REGIONS: &str = "IncludeRegions";
    /// Exclusion region list.
    pub const EXCLUDE_REGIONS: &str = "ExcludeRegions";
    /// Default configuration block.
    pub const DEFAULT_CONFIGURATION: &str = "DefaultConfiguration";
    /// Ordered override blocks.
    pub const ACCOUNT_OVERRIDE_CONFIGURATIONS: &str = "AccountOverrideConfigurations";
}

/// Field value types.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// String; numbers are coerced to their decimal text.
    String,
    /// Boolean; `"true"`/`"false"` strings are accepted in any case.
    Boolean,
    /// Signed integer; numeric strings are accepted.
    Integer,
    /// List of strings; a lone scalar becomes a one-item list.
    StringList,
    /// Nested mapping.
    Object(ObjectSchema),
    /// List of nested mappings.
    ObjectList(ObjectSchema),
    /// Anything, passed through untouched.
    Any,
}

/// Value constraints checked after coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Character count bounds for strings (and for each item of string lists).
    Length {
        /// Minimum characters.
        min: usize,
        /// Maximum characters.
        max: usize,
    },
    /// Inclusive integer bounds.
    Range {
        /// Minimum value.
        min: i64,
        /// Maximum value.
        max: i64,
    },
    /// Enumerated string values (each item for string lists).
    OneOf(&'static [&'static str]),
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name as written in the document.
    pub name: &'static str,
    /// Value type.
    pub field_type: FieldType,
    /// Whether the field must be present.
    pub required: bool,
    /// Value filled in when an optional field is absent.
    pub default: Option<Value>,
    /// Whether account context placeholders may appear in the value.
    pub substitutable: bool,
    /// Extra checks on the coerced value.
    pub constraints: Vec<Constraint>,
}

impl FieldSpec {
    /// A required field.
    #[must_use]
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
            default: None,
            substitutable: false,
            constraints: Vec::new(),
        }
    }

    /// An optional field without a default.
    #[must_use]
    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            default: None,
            substitutable: false,
            constraints: Vec::new(),
        }
    }

    /// Set the default used when the field is absent.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Allow `{{ account_id }}`-style placeholders in this field.
    #[must_use]
    pub const fn substitutable(mut self) -> Self {
        self.substitutable = true;
        self
    }

    /// Add a constraint.
    #[must_use]
    pub fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    fn normalize(
        &self,
        value: &Value,
        path: &str,
        variables: &[&str],
        errors: &mut ValidationErrors,
    ) -> Option<Value> {
        match &self.field_type {
            FieldType::String => {
                let Some(s) = coerce_string(value) else {
                    errors.add(path, "expected a string");
                    return None;
                };
                self.check_string(&s, path, variables, errors);
                Some(Value::String(s))
            }
            FieldType::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => {
                    errors.add(path, "expected a boolean");
                    None
                }
            },
            FieldType::Integer => {
                let parsed = match value {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                let Some(n) = parsed else {
                    errors.add(path, "expected an integer");
                    return None;
                };
                for constraint in &self.constraints {
                    if let Constraint::Range { min, max } = constraint {
                        if n < *min || n > *max {
                            errors.add(path, format!("must be between {min} and {max}"));
                        }
                    }
                }
                Some(Value::from(n))
            }
            FieldType::StringList => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    Value::String(_) | Value::Number(_) => vec![value],
                    _ => {
                        errors.add(path, "expected a list of strings");
                        return None;
                    }
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let item_path = index_path(path, i);
                    match coerce_string(item) {
                        Some(s) => {
                            self.check_string(&s, &item_path, variables, errors);
                            out.push(Value::String(s));
                        }
                        None => errors.add(item_path, "expected a string"),
                    }
                }
                Some(Value::Array(out))
            }
            FieldType::Object(schema) => Some(schema.normalize_at(value, path, variables, errors)),
            FieldType::ObjectList(schema) => {
                let Value::Array(items) = value else {
                    errors.add(path, "expected a list of mappings");
                    return None;
                };
                Some(Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| schema.normalize_at(item, &index_path(path, i), variables, errors))
                        .collect(),
                ))
            }
            FieldType::Any => Some(value.clone()),
        }
    }

    fn check_string(&self, s: &str, path: &str, variables: &[&str], errors: &mut ValidationErrors) {
        for constraint in &self.constraints {
            match constraint {
                Constraint::Length { min, max } => {
                    let len = s.chars().count();
                    if len < *min || len > *max {
                        errors.add(path, format!("must be between {min} and {max} characters"));
                    }
                }
                Constraint::OneOf(allowed) => {
                    if !allowed.contains(&s) {
                        errors.add(path, format!("must be one of: {}", allowed.join(", ")));
                    }
                }
                Constraint::Range { .. } => {}
            }
        }

        if self.substitutable {
            for variable in render::placeholders(s) {
                if !render::is_known_variable(variable) {
                    errors.add(path, format!("unknown template variable `{variable}`"));
                } else if !variables.contains(&variable) {
                    errors.add(
                        path,
                        format!("template variable `{variable}` is not available for this worker"),
                    );
                }
            }
        }
    }
}

/// A mapping schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    /// Declared fields in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Reject undeclared keys when set; otherwise pass them through.
    pub closed: bool,
    /// Groups of field names of which exactly one must be present.
    pub exactly_one_of: Vec<&'static [&'static str]>,
}

impl ObjectSchema {
    /// A schema rejecting unknown keys.
    #[must_use]
    pub const fn closed(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            closed: true,
            exactly_one_of: Vec::new(),
        }
    }

    /// A schema passing unknown keys through.
    #[must_use]
    pub const fn open(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            closed: false,
            exactly_one_of: Vec::new(),
        }
    }

    /// Require exactly one of `names` to be present.
    #[must_use]
    pub fn exactly_one_of(mut self, names: &'static [&'static str]) -> Self {
        self.exactly_one_of.push(names);
        self
    }

    /// Look up a declared field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Normalize a document against this schema.
    ///
    /// `variables` lists the placeholder names the worker can supply.
    ///
    /// # Errors
    ///
    /// Every problem found, keyed by field path.
    pub fn normalize(&self, value: &Value, variables: &[&str]) -> Result<Value, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let normalized = self.normalize_at(value, "", variables, &mut errors);
        errors.into_result().map(|()| normalized)
    }

    fn normalize_at(
        &self,
        value: &Value,
        path: &str,
        variables: &[&str],
        errors: &mut ValidationErrors,
    ) -> Value {
        let Some(map) = value.as_object() else {
            errors.add(path, "expected a mapping");
            return Value::Null;
        };

        let mut out = Map::new();
        for field in &self.fields {
            let field_path = field_path(path, field.name);
            match map.get(field.name).filter(|v| !v.is_null()) {
                Some(v) => {
                    if let Some(normalized) = field.normalize(v, &field_path, variables, errors) {
                        out.insert(field.name.to_string(), normalized);
                    }
                }
                None if field.required => errors.add(field_path, "is required"),
                None => {
                    if let Some(default) = &field.default {
                        out.insert(field.name.to_string(), default.clone());
                    }
                }
            }
        }

        for (key, v) in map {
            if self.field(key).is_some() {
                continue;
            }
            if self.closed {
                errors.add(field_path(path, key), "is not a recognized field");
            } else {
                out.insert(key.clone(), v.clone());
            }
        }

        for group in &self.exactly_one_of {
            let present = group.iter().filter(|name| out.contains_key(**name)).count();
            if present != 1 {
                errors.add(path, format!("exactly one of {} must be set", group.join(", ")));
            }
        }

        Value::Object(out)
    }

    /// Paths of substitutable string fields, relative to this schema.
    ///
    /// List and nested fields use `[]` for "every item".
    #[must_use]
    pub fn substitution_points(&self) -> Vec<String> {
        let mut points = Vec::new();
        self.collect_points("", &mut points);
        points
    }

    fn collect_points(&self, prefix: &str, points: &mut Vec<String>) {
        for field in &self.fields {
            let path = field_path(prefix, field.name);
            match &field.field_type {
                FieldType::String | FieldType::StringList if field.substitutable => points.push(path),
                FieldType::Object(schema) => schema.collect_points(&path, points),
                FieldType::ObjectList(schema) => schema.collect_points(&format!("{path}[]"), points),
                _ => {}
            }
        }
    }
}

/// A worker's declared payload: its own top-level fields plus an optional
/// configuration block shape used by `DefaultConfiguration` and override entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayloadSchema {
    /// Worker-specific top-level fields.
    pub fields: Vec<FieldSpec>,
    /// Shape of `DefaultConfiguration` and of each override's configuration.
    pub configuration: Option<ObjectSchema>,
    /// Reject unknown top-level keys.
    pub closed: bool,
}

impl PayloadSchema {
    /// Closed schema with worker-specific fields.
    #[must_use]
    pub const fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            configuration: None,
            closed: true,
        }
    }

    /// Declare the configuration block shape.
    #[must_use]
    pub fn with_configuration(mut self, configuration: ObjectSchema) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Accept undeclared top-level keys.
    #[must_use]
    pub const fn open(mut self) -> Self {
        self.closed = false;
        self
    }

    /// Full template document schema for `strategy`.
    #[must_use]
    pub fn document_schema(&self, strategy: FanOutStrategy) -> ObjectSchema {
        let mut doc = vec![
            FieldSpec::required(fields::TEMPLATE_NAME, FieldType::String)
                .constrain(Constraint::Length { min: 1, max: 256 }),
            FieldSpec::required(fields::TEMPLATE_DESCRIPTION, FieldType::String),
        ];

        if strategy.is_account_scoped() {
            doc.extend(targeting_fields(strategy));
            doc.push(
                FieldSpec::optional(fields::OPERATE_IN_ORG_ROOT, FieldType::Boolean)
                    .with_default(Value::Bool(false)),
            );
        }

        if let Some(configuration) = &self.configuration {
            doc.push(FieldSpec::required(
                fields::DEFAULT_CONFIGURATION,
                FieldType::Object(configuration.clone()),
            ));
            if strategy.is_account_scoped() {
                let mut entry = configuration.clone();
                entry.fields.extend(targeting_fields(strategy));
                doc.push(
                    FieldSpec::optional(
                        fields::ACCOUNT_OVERRIDE_CONFIGURATIONS,
                        FieldType::ObjectList(entry),
                    )
                    .with_default(Value::Array(Vec::new())),
                );
            }
        }

        doc.extend(self.fields.iter().cloned());
        ObjectSchema {
            fields: doc,
            closed: self.closed,
            exactly_one_of: Vec::new(),
        }
    }
}

/// Schema of an `IncludeAccounts`/`ExcludeAccounts` block.
#[must_use]
pub fn account_filter_schema() -> ObjectSchema {
    let tag = ObjectSchema::closed(vec![
        FieldSpec::required("Name", FieldType::String).constrain(Constraint::Length { min: 1, max: 128 }),
        FieldSpec::required("Value", FieldType::String).constrain(Constraint::Length { min: 0, max: 256 }),
    ]);
    ObjectSchema::closed(vec![
        FieldSpec::optional("AllAccounts", FieldType::Boolean).with_default(Value::Bool(false)),
        FieldSpec::optional("ByIds", FieldType::StringList)
            .constrain(Constraint::Length { min: 1, max: 12 }),
        FieldSpec::optional("ByNames", FieldType::StringList)
            .constrain(Constraint::Length { min: 1, max: 128 }),
        FieldSpec::optional("ByTags", FieldType::ObjectList(tag)),
        FieldSpec::optional("ByOrgUnits", FieldType::StringList)
            .constrain(Constraint::Length { min: 1, max: 128 }),
    ])
}

fn targeting_fields(strategy: FanOutStrategy) -> Vec<FieldSpec> {
    let mut out = vec![
        FieldSpec::required(fields::INCLUDE_ACCOUNTS, FieldType::Object(account_filter_schema())),
        FieldSpec::optional(fields::EXCLUDE_ACCOUNTS, FieldType::Object(account_filter_schema())),
    ];
    if strategy.is_region_scoped() {
        out.push(FieldSpec::required(fields::INCLUDE_REGIONS, FieldType::StringList));
        out.push(
            FieldSpec::optional(fields::EXCLUDE_REGIONS, FieldType::StringList)
                .with_default(Value::Array(Vec::new())),
        );
    }
    out
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Validation problems keyed by field path, e.g. `IncludeAccounts.ByTags[0].Name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Record a problem at `path`; the empty path means the whole document.
    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(path.into()).or_default().push(message.into());
    }

    /// Single-problem collection.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(path, message);
        errors
    }

    /// Whether no problem was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of paths with problems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Messages recorded at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[String]> {
        self.errors.get(path).map(Vec::as_slice)
    }

    /// Iterate paths and their messages in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.errors.iter()
    }

    /// Fold another collection into this one.
    pub fn merge(&mut self, other: Self) {
        for (path, messages) in other.errors {
            self.errors.entry(path).or_default().extend(messages);
        }
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` when any problem was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                if path.is_empty() {
                    write!(f, "<document>: {message}")?;
                } else {
                    write!(f, "{path}: {message}")?;
                }
            }
        }
        Ok(())
    }
}
