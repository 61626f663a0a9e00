mod path;
mod rules;

pub use path::{FieldPath, Segment};
pub use rules::{
    AsyncValidatorFn, FieldRules, ItemRules, Rule, RuleOutcome, Stage, SyncValidatorFn,
};
