//! Per-field validation rules.
//!
//! Every rule kind is a variant of [`Rule`]; the pipeline walks them in
//! [`Stage`] order and dispatches on the variant.

use std::{fmt, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

/// `Ok(())` passes, `Err(message)` fails with a human readable message.
pub type RuleOutcome = Result<(), String>;

/// Sync validator: receives the field value and the whole value tree.
pub type SyncValidatorFn = Arc<dyn Fn(&Value, &Value) -> RuleOutcome + Send + Sync>;

/// Async validator. An `Err` of the outer result means the validator itself
/// broke (network failure and the like), not that the value is invalid.
pub type AsyncValidatorFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<RuleOutcome>> + Send + Sync>;

/// Evaluation stage; rules run in ascending stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Required,
    Pattern,
    Length,
    Range,
    Validate,
    Async,
}

#[derive(Clone)]
pub enum Rule {
    Required { message: String },
    Pattern { regex: Regex, message: String },
    MinLength { limit: usize, message: String },
    MaxLength { limit: usize, message: String },
    Min { limit: f64, message: String },
    Max { limit: f64, message: String },
    Validate { name: String, check: SyncValidatorFn },
    ValidateAsync { name: String, check: AsyncValidatorFn },
}

impl Rule {
    pub fn stage(&self) -> Stage {
        match self {
            Rule::Required { .. } => Stage::Required,
            Rule::Pattern { .. } => Stage::Pattern,
            Rule::MinLength { .. } | Rule::MaxLength { .. } => Stage::Length,
            Rule::Min { .. } | Rule::Max { .. } => Stage::Range,
            Rule::Validate { .. } => Stage::Validate,
            Rule::ValidateAsync { .. } => Stage::Async,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Rule::ValidateAsync { .. })
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required { message } => f.debug_struct("Required").field("message", message).finish(),
            Rule::Pattern { regex, message } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("message", message)
                .finish(),
            Rule::MinLength { limit, message } => f
                .debug_struct("MinLength")
                .field("limit", limit)
                .field("message", message)
                .finish(),
            Rule::MaxLength { limit, message } => f
                .debug_struct("MaxLength")
                .field("limit", limit)
                .field("message", message)
                .finish(),
            Rule::Min { limit, message } => f
                .debug_struct("Min")
                .field("limit", limit)
                .field("message", message)
                .finish(),
            Rule::Max { limit, message } => f
                .debug_struct("Max")
                .field("limit", limit)
                .field("message", message)
                .finish(),
            Rule::Validate { name, .. } => f.debug_struct("Validate").field("name", name).finish(),
            Rule::ValidateAsync { name, .. } => {
                f.debug_struct("ValidateAsync").field("name", name).finish()
            }
        }
    }
}

/// Ordered rule list for one field.
///
/// Rules are kept sorted by [`Stage`]; within a stage, registration order is
/// preserved, so declared validators run in the order they were added.
///
/// ```ignore
/// let rules = FieldRules::new()
///     .required("Username is required")
///     .validate("notAdmin", |value, _| match value.as_str() {
///         Some("admin") => Err("Pick another name".into()),
///         _ => Ok(()),
///     });
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    rules: Vec<Rule>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, rule: Rule) -> Self {
        let stage = rule.stage();
        let at = self
            .rules
            .iter()
            .position(|existing| existing.stage() > stage)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
        self
    }

    pub fn required(self, message: impl Into<String>) -> Self {
        self.push(Rule::Required {
            message: message.into(),
        })
    }

    pub fn pattern(self, regex: Regex, message: impl Into<String>) -> Self {
        self.push(Rule::Pattern {
            regex,
            message: message.into(),
        })
    }

    pub fn try_pattern(self, pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(self.pattern(regex, message))
    }

    pub fn min_length(self, limit: usize, message: impl Into<String>) -> Self {
        self.push(Rule::MinLength {
            limit,
            message: message.into(),
        })
    }

    pub fn max_length(self, limit: usize, message: impl Into<String>) -> Self {
        self.push(Rule::MaxLength {
            limit,
            message: message.into(),
        })
    }

    pub fn min(self, limit: f64, message: impl Into<String>) -> Self {
        self.push(Rule::Min {
            limit,
            message: message.into(),
        })
    }

    pub fn max(self, limit: f64, message: impl Into<String>) -> Self {
        self.push(Rule::Max {
            limit,
            message: message.into(),
        })
    }

    pub fn validate<F>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &Value) -> RuleOutcome + Send + Sync + 'static,
    {
        self.push(Rule::Validate {
            name: name.into(),
            check: Arc::new(check),
        })
    }

    pub fn validate_async<F, Fut>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleOutcome> + Send + 'static,
    {
        self.push(Rule::ValidateAsync {
            name: name.into(),
            check: Arc::new(move |value: Value| {
                check(value).map(Ok::<RuleOutcome, anyhow::Error>).boxed()
            }),
        })
    }

    /// Like [`FieldRules::validate_async`], for validators that can fail on
    /// their own (e.g. a lookup service being down).
    pub fn validate_async_fallible<F, Fut>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RuleOutcome>> + Send + 'static,
    {
        self.push(Rule::ValidateAsync {
            name: name.into(),
            check: Arc::new(move |value: Value| check(value).boxed()),
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn has_async(&self) -> bool {
        self.rules.iter().any(Rule::is_async)
    }

    pub fn sync_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| !rule.is_async())
    }

    pub fn async_rules(&self) -> Vec<(String, AsyncValidatorFn)> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                Rule::ValidateAsync { name, check } => Some((name.clone(), Arc::clone(check))),
                _ => None,
            })
            .collect()
    }
}

/// Rules applied to every entry of a field array.
///
/// Object entries get one field per key (`fields`); scalar entries are a
/// single field validated by `entry`.
#[derive(Debug, Clone, Default)]
pub struct ItemRules {
    pub fields: IndexMap<String, FieldRules>,
    pub entry: FieldRules,
}

impl ItemRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.insert(name.into(), rules);
        self
    }

    pub fn entry(mut self, rules: FieldRules) -> Self {
        self.entry = rules;
        self
    }
}
