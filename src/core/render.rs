//! Payload rendering and account-context substitution.
//!
//! Substitution is restricted to string fields a schema flags as substitutable, and to
//! the fixed variables below. No other expression syntax is evaluated.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::core::fanout::{FanOutStrategy, TaskSkeleton};
use crate::core::schema::{FieldType, ObjectSchema};

/// Target account id.
pub const ACCOUNT_ID: &str = "account_id";
/// Target account display name.
pub const ACCOUNT_NAME: &str = "account_name";
/// Target region.
pub const REGION: &str = "region";

/// Payload key holding the target account id.
pub const ASSIGNED_ACCOUNT: &str = "AssignedAccount";
/// Payload key holding the target account name.
pub const ASSIGNED_ACCOUNT_NAME: &str = "AssignedAccountName";
/// Payload key holding the target region.
pub const ASSIGNED_REGION: &str = "AssignedRegion";
/// Payload key holding the matched configuration block.
pub const CONFIGURATION: &str = "Configuration";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Whether `name` is one of the supported variables.
#[must_use]
pub fn is_known_variable(name: &str) -> bool {
    matches!(name, ACCOUNT_ID | ACCOUNT_NAME | REGION)
}

/// Variables a worker with `strategy` can supply.
#[must_use]
pub const fn available_variables(strategy: FanOutStrategy) -> &'static [&'static str] {
    match strategy {
        FanOutStrategy::Single => &[],
        FanOutStrategy::Account => &[ACCOUNT_ID, ACCOUNT_NAME],
        FanOutStrategy::AccountRegion => &[ACCOUNT_ID, ACCOUNT_NAME, REGION],
    }
}

/// Variable names referenced by `{{ name }}` placeholders in `input`.
#[must_use]
pub fn placeholders(input: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(input)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Account context for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    /// Target account id.
    pub account_id: Option<String>,
    /// Target account name.
    pub account_name: Option<String>,
    /// Target region.
    pub region: Option<String>,
}

impl RenderContext {
    /// Context for a skeleton, with the account name looked up by the caller.
    #[must_use]
    pub fn for_skeleton(skeleton: &TaskSkeleton, account_name: Option<String>) -> Self {
        Self {
            account_id: skeleton.account_id.clone(),
            account_name,
            region: skeleton.region.clone(),
        }
    }

    fn lookup(&self, variable: &str) -> Option<&str> {
        match variable {
            ACCOUNT_ID => self.account_id.as_deref(),
            ACCOUNT_NAME => self.account_name.as_deref(),
            REGION => self.region.as_deref(),
            _ => None,
        }
    }

    /// Replace placeholders in `input`; unresolvable ones are left as written.
    #[must_use]
    pub fn substitute(&self, input: &str) -> String {
        PLACEHOLDER
            .replace_all(input, |caps: &Captures<'_>| {
                caps.get(1)
                    .and_then(|m| self.lookup(m.as_str()))
                    .map_or_else(|| caps[0].to_string(), str::to_string)
            })
            .into_owned()
    }

    /// Apply substitution to the substitutable fields of `value`, following `schema`.
    pub fn substitute_fields(&self, schema: &ObjectSchema, value: &mut Value) {
        let Some(map) = value.as_object_mut() else {
            return;
        };
        for field in &schema.fields {
            let Some(slot) = map.get_mut(field.name) else {
                continue;
            };
            match (&field.field_type, slot) {
                (FieldType::String, Value::String(s)) if field.substitutable => {
                    *s = self.substitute(s);
                }
                (FieldType::StringList, Value::Array(items)) if field.substitutable => {
                    for item in items {
                        if let Value::String(s) = item {
                            *s = self.substitute(s);
                        }
                    }
                }
                (FieldType::Object(nested), slot) => self.substitute_fields(nested, slot),
                (FieldType::ObjectList(nested), Value::Array(items)) => {
                    for item in items {
                        self.substitute_fields(nested, item);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Build the final payload for one task.
///
/// `base` is the normalized template without its configuration sections. The matched
/// configuration block is placed under `Configuration` and the assigned context keys are
/// filled from `ctx`.
#[must_use]
pub fn render_payload(
    document_schema: &ObjectSchema,
    configuration_schema: Option<&ObjectSchema>,
    base: &Map<String, Value>,
    configuration: Option<&Value>,
    ctx: &RenderContext,
) -> Value {
    let mut payload = Value::Object(base.clone());
    ctx.substitute_fields(document_schema, &mut payload);

    if let Value::Object(map) = &mut payload {
        if let Some(block) = configuration {
            let mut block = block.clone();
            if let Some(schema) = configuration_schema {
                ctx.substitute_fields(schema, &mut block);
            }
            map.insert(CONFIGURATION.to_string(), block);
        }
        if let Some(account) = &ctx.account_id {
            map.insert(ASSIGNED_ACCOUNT.to_string(), Value::String(account.clone()));
        }
        if let Some(name) = &ctx.account_name {
            map.insert(ASSIGNED_ACCOUNT_NAME.to_string(), Value::String(name.clone()));
        }
        if let Some(region) = &ctx.region {
            map.insert(ASSIGNED_REGION.to_string(), Value::String(region.clone()));
        }
    }
    payload
}
