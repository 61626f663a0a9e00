//! Declarative form definitions.
//!
//! A definition names the defaults, the per-field rules, the field arrays and
//! the engine options of a form, so a form can be described in a JSON, YAML
//! or TOML document instead of code:
//!
//! ```json
//! {
//!   "defaults": { "username": "", "age": 0 },
//!   "options": { "mode": "on_blur" },
//!   "fields": {
//!     "username": { "required": "Username is required", "min_length": 3 },
//!     "age": { "min": { "value": 0, "message": "age must be positive" } }
//!   },
//!   "arrays": {
//!     "phNumbers": { "fields": { "number": { "required": true } } }
//!   }
//! }
//! ```

mod loader;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{FieldRules, ItemRules},
    form::{FormEngine, FormOptions, RevalidateMode, ValidationMode},
    validation::JsonSchemaAdapter,
};

pub use loader::{load_definition, parse_definition};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormDefinition {
    pub defaults: Value,
    pub options: OptionsDefinition,
    /// Field path to rules, registered in document order.
    pub fields: IndexMap<String, FieldDefinition>,
    pub arrays: IndexMap<String, ArrayDefinition>,
    /// JSON Schema that replaces the per-field rules when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsDefinition {
    pub mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    pub reset_on_submit_success: bool,
    pub should_unregister: bool,
}

/// `true`/`false`, or the message to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    Flag(bool),
    Message(String),
}

/// A limit given bare (`3`) or with its own message
/// (`{ "value": 3, "message": "too short" }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint<T> {
    Bare(T),
    Detailed {
        value: T,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl<T: Clone> Constraint<T> {
    fn split(&self, fallback: impl FnOnce(&T) -> String) -> (T, String) {
        match self {
            Constraint::Bare(value) => (value.clone(), fallback(value)),
            Constraint::Detailed { value, message } => (
                value.clone(),
                message.clone().unwrap_or_else(|| fallback(value)),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldDefinition {
    /// Initial value when `defaults` has nothing at the path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Requirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Constraint<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Constraint<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Constraint<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Constraint<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Constraint<f64>>,
}

impl FieldDefinition {
    /// Builds the rule chain; `label` names the field in default messages.
    pub fn to_rules(&self, label: &str) -> Result<FieldRules> {
        let mut rules = FieldRules::new();
        match &self.required {
            Some(Requirement::Flag(true)) => rules = rules.required(format!("{label} is required")),
            Some(Requirement::Message(message)) => rules = rules.required(message.clone()),
            Some(Requirement::Flag(false)) | None => {}
        }
        if let Some(pattern) = &self.pattern {
            let (pattern, message) = pattern.split(|_| format!("{label} has an invalid format"));
            rules = rules
                .try_pattern(&pattern, message)
                .with_context(|| format!("invalid pattern for {label}: {pattern}"))?;
        }
        if let Some(limit) = &self.min_length {
            let (limit, message) = limit.split(|n| format!("{label} must be at least {n} long"));
            rules = rules.min_length(limit, message);
        }
        if let Some(limit) = &self.max_length {
            let (limit, message) = limit.split(|n| format!("{label} must be at most {n} long"));
            rules = rules.max_length(limit, message);
        }
        if let Some(limit) = &self.min {
            let (limit, message) = limit.split(|n| format!("{label} must be at least {n}"));
            rules = rules.min(limit, message);
        }
        if let Some(limit) = &self.max {
            let (limit, message) = limit.split(|n| format!("{label} must be at most {n}"));
            rules = rules.max(limit, message);
        }
        Ok(rules)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArrayDefinition {
    /// Rules per key of object entries.
    pub fields: IndexMap<String, FieldDefinition>,
    /// Rules for scalar entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<FieldDefinition>,
}

impl ArrayDefinition {
    pub fn to_item_rules(&self, name: &str) -> Result<ItemRules> {
        let mut rules = ItemRules::new();
        for (key, field) in &self.fields {
            rules = rules.field(key.clone(), field.to_rules(key)?);
        }
        if let Some(entry) = &self.entry {
            rules = rules.entry(entry.to_rules(name)?);
        }
        Ok(rules)
    }
}

impl FormDefinition {
    pub fn form_options(&self) -> Result<FormOptions> {
        let mut options = FormOptions::new()
            .with_mode(self.options.mode)
            .with_revalidate_mode(self.options.revalidate_mode)
            .with_reset_on_submit_success(self.options.reset_on_submit_success)
            .with_should_unregister(self.options.should_unregister);
        if let Some(schema) = &self.schema {
            options = options.with_resolver(JsonSchemaAdapter::new(schema)?);
        }
        Ok(options)
    }

    /// Creates an engine with every field and array registered.
    pub fn build(&self) -> Result<FormEngine> {
        let form = FormEngine::with_options(self.defaults.clone(), self.form_options()?);
        for (path, field) in &self.fields {
            let rules = field.to_rules(path)?;
            form.register(path, field.default.clone(), rules)
                .with_context(|| format!("failed to register field {path}"))?;
        }
        for (name, array) in &self.arrays {
            form.field_array(name, array.to_item_rules(name)?)
                .with_context(|| format!("failed to bind field array {name}"))?;
        }
        Ok(form)
    }
}
