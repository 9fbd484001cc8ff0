//! Template validation into typed targeting and configuration blocks.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::account::Region;
use crate::core::fanout::FanOutStrategy;
use crate::core::filter::{AccountFilter, RegionFilter, RegionSelection, ALL_REGIONS, NO_REGIONS};
use crate::core::render::available_variables;
use crate::core::schema::{fields, PayloadSchema, ValidationErrors};
use crate::core::DispatchError;

const MAX_ORG_UNIT_ID_LEN: usize = 68;

/// Which accounts and regions a template (or one override) applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Targeting {
    /// Inclusion filter.
    pub include: AccountFilter,
    /// Exclusion filter; always wins over inclusion.
    pub exclude: AccountFilter,
    /// Allow the org-root account when it is also included.
    pub operate_in_org_root: bool,
    /// Region restriction; only consulted for ACCOUNT_REGION workers.
    pub regions: RegionFilter,
}

impl Targeting {
    /// Targeting with the given inclusion filter and nothing else.
    #[must_use]
    pub fn including(include: AccountFilter) -> Self {
        Self {
            include,
            ..Self::default()
        }
    }
}

/// One `AccountOverrideConfigurations` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideConfiguration {
    /// Position in the override list.
    pub index: usize,
    /// Targets of this override. The org-root check is never applied to overrides.
    pub targeting: Targeting,
    /// The configuration block with the filter keys removed.
    pub configuration: Value,
}

/// A template that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTemplate {
    /// Object key the template was read from.
    pub key: String,
    /// `TemplateName`.
    pub name: String,
    /// `TemplateDescription`.
    pub description: String,
    /// Targeting for account-scoped workers.
    pub targeting: Option<Targeting>,
    /// `DefaultConfiguration`, if the worker declares a configuration block.
    pub default_configuration: Option<Value>,
    /// Override blocks in document order.
    pub overrides: Vec<OverrideConfiguration>,
    /// Normalized document without the configuration sections.
    pub base: Map<String, Value>,
}

/// Validates raw template documents for a worker.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValidator<'a> {
    supported_regions: &'a BTreeSet<Region>,
}

impl<'a> TemplateValidator<'a> {
    /// Validator accepting regions from `supported_regions`.
    #[must_use]
    pub const fn new(supported_regions: &'a BTreeSet<Region>) -> Self {
        Self { supported_regions }
    }

    /// Validate `raw` against the worker's schema and strategy.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::SchemaValidation`] for missing, mistyped or unsupported values.
    /// - [`DispatchError::MalformedFilter`] when `AllAccounts` is combined with other
    ///   criteria or used for exclusion.
    pub fn validate(
        &self,
        key: &str,
        raw: &Value,
        strategy: FanOutStrategy,
        payload: &PayloadSchema,
    ) -> Result<ValidatedTemplate, DispatchError> {
        let schema = payload.document_schema(strategy);
        let normalized = schema.normalize(raw, available_variables(strategy))?;
        let Value::Object(mut map) = normalized else {
            return Err(ValidationErrors::single("", "expected a mapping").into());
        };

        let mut errors = ValidationErrors::default();

        let targeting = if strategy.is_account_scoped() {
            let mut targeting = self.targeting(&map, "", strategy, &mut errors)?;
            targeting.operate_in_org_root = map
                .get(fields::OPERATE_IN_ORG_ROOT)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(targeting)
        } else {
            None
        };

        let default_configuration = map.remove(fields::DEFAULT_CONFIGURATION);

        let mut overrides = Vec::new();
        if let Some(Value::Array(entries)) = map.remove(fields::ACCOUNT_OVERRIDE_CONFIGURATIONS) {
            for (index, entry) in entries.into_iter().enumerate() {
                let path = format!("{}[{index}]", fields::ACCOUNT_OVERRIDE_CONFIGURATIONS);
                let Value::Object(mut entry) = entry else {
                    return Err(ValidationErrors::single(path, "expected a mapping").into());
                };
                let mut targeting = self.targeting(&entry, &path, strategy, &mut errors)?;
                targeting.operate_in_org_root = true;
                for field in [
                    fields::INCLUDE_ACCOUNTS,
                    fields::EXCLUDE_ACCOUNTS,
                    fields::INCLUDE_REGIONS,
                    fields::EXCLUDE_REGIONS,
                ] {
                    entry.remove(field);
                }
                overrides.push(OverrideConfiguration {
                    index,
                    targeting,
                    configuration: Value::Object(entry),
                });
            }
        }

        errors.into_result()?;

        let text = |field: &str| {
            map.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let template = ValidatedTemplate {
            key: key.to_string(),
            name: text(fields::TEMPLATE_NAME),
            description: text(fields::TEMPLATE_DESCRIPTION),
            targeting,
            default_configuration,
            overrides,
            base: map,
        };
        debug!(
            template_key = key,
            name = %template.name,
            overrides = template.overrides.len(),
            "template validated"
        );
        Ok(template)
    }

    fn targeting(
        &self,
        map: &Map<String, Value>,
        path: &str,
        strategy: FanOutStrategy,
        errors: &mut ValidationErrors,
    ) -> Result<Targeting, DispatchError> {
        let at = |field: &str| {
            if path.is_empty() {
                field.to_string()
            } else {
                format!("{path}.{field}")
            }
        };

        let include = parse_filter(map.get(fields::INCLUDE_ACCOUNTS), &at(fields::INCLUDE_ACCOUNTS), errors);
        let exclude = parse_filter(map.get(fields::EXCLUDE_ACCOUNTS), &at(fields::EXCLUDE_ACCOUNTS), errors);
        include.validate_include()?;
        exclude.validate_exclude()?;

        if include.is_empty() {
            errors.add(
                at(fields::INCLUDE_ACCOUNTS),
                "must set AllAccounts or at least one of ByIds, ByNames, ByTags, ByOrgUnits",
            );
        }
        check_org_units(&include, &at(fields::INCLUDE_ACCOUNTS), errors);
        check_org_units(&exclude, &at(fields::EXCLUDE_ACCOUNTS), errors);

        let regions = if strategy.is_region_scoped() {
            self.region_filter(map, &at, errors)
        } else {
            RegionFilter::default()
        };

        Ok(Targeting {
            include,
            exclude,
            operate_in_org_root: false,
            regions,
        })
    }

    fn region_filter(
        &self,
        map: &Map<String, Value>,
        at: &dyn Fn(&str) -> String,
        errors: &mut ValidationErrors,
    ) -> RegionFilter {
        let include_values = string_list(map.get(fields::INCLUDE_REGIONS));
        let include = if include_values.is_empty() {
            errors.add(at(fields::INCLUDE_REGIONS), "must name at least one region");
            RegionSelection::None
        } else {
            match RegionSelection::parse(&include_values) {
                Ok(selection) => selection,
                Err(message) => {
                    errors.add(at(fields::INCLUDE_REGIONS), message);
                    RegionSelection::None
                }
            }
        };
        if let RegionSelection::Only(regions) = &include {
            self.check_catalog(regions, &at(fields::INCLUDE_REGIONS), errors);
        }

        let exclude: BTreeSet<Region> = string_list(map.get(fields::EXCLUDE_REGIONS))
            .into_iter()
            .collect();
        if exclude.contains(ALL_REGIONS) || exclude.contains(NO_REGIONS) {
            errors.add(
                at(fields::EXCLUDE_REGIONS),
                format!("`{ALL_REGIONS}` and `{NO_REGIONS}` are not allowed here"),
            );
        } else {
            self.check_catalog(&exclude, &at(fields::EXCLUDE_REGIONS), errors);
        }

        RegionFilter { include, exclude }
    }

    fn check_catalog(&self, regions: &BTreeSet<Region>, path: &str, errors: &mut ValidationErrors) {
        for region in regions {
            if !self.supported_regions.contains(region) {
                errors.add(path, format!("unsupported region `{region}`"));
            }
        }
    }
}

fn parse_filter(value: Option<&Value>, path: &str, errors: &mut ValidationErrors) -> AccountFilter {
    let Some(value) = value else {
        return AccountFilter::default();
    };
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        errors.add(path, format!("invalid account filter: {e}"));
        AccountFilter::default()
    })
}

fn check_org_units(filter: &AccountFilter, path: &str, errors: &mut ValidationErrors) {
    for unit in &filter.by_org_units {
        if unit.starts_with("ou-") && unit.len() > MAX_ORG_UNIT_ID_LEN {
            errors.add(
                format!("{path}.ByOrgUnits"),
                format!("org unit id `{unit}` is longer than {MAX_ORG_UNIT_ID_LEN} characters"),
            );
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
