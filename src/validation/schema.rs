use std::fmt;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use jsonschema::{Validator, error::ValidationErrorKind, validator_for};
use log::trace;
use serde::Serialize;
use serde_json::Value;

use crate::domain::FieldPath;

/// Result of validating a whole value tree at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    /// Dotted field path to message; the first error per path wins.
    pub errors_by_path: IndexMap<String, String>,
}

impl SchemaReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors_by_path: IndexMap::new(),
        }
    }

    pub fn with_error(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.valid = false;
        self.errors_by_path
            .entry(path.into())
            .or_insert_with(|| message.into());
        self
    }
}

/// External validator that replaces the per-field rule chains. When a form
/// has one, every validation pass calls it with the full value tree.
pub trait SchemaAdapter: Send + Sync {
    fn validate(&self, values: &Value) -> SchemaReport;
}

impl<F> SchemaAdapter for F
where
    F: Fn(&Value) -> SchemaReport + Send + Sync,
{
    fn validate(&self, values: &Value) -> SchemaReport {
        self(values)
    }
}

/// [`SchemaAdapter`] backed by a compiled JSON Schema.
pub struct JsonSchemaAdapter {
    validator: Validator,
}

impl fmt::Debug for JsonSchemaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaAdapter").finish_non_exhaustive()
    }
}

impl JsonSchemaAdapter {
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = validator_for(schema).context("failed to compile JSON schema")?;
        Ok(Self { validator })
    }
}

impl SchemaAdapter for JsonSchemaAdapter {
    fn validate(&self, values: &Value) -> SchemaReport {
        if self.validator.is_valid(values) {
            return SchemaReport::valid();
        }
        let mut report = SchemaReport::default();
        for error in self.validator.iter_errors(values) {
            let mut path = FieldPath::from_pointer(&error.instance_path.to_string());
            // A missing property is reported against its parent object.
            if let ValidationErrorKind::Required { property } = &error.kind {
                if let Some(name) = property.as_str() {
                    path = path.child_key(name);
                }
            }
            trace!("schema error at {path}: {error}");
            report = report.with_error(path.to_string(), error.to_string());
        }
        report
    }
}
