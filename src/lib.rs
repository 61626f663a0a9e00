#![deny(rust_2018_idioms)]

//! Form state and validation engine.
//!
//! A [`FormEngine`] owns a JSON value tree and the fields registered on it.
//! Each field carries its interaction state (touched, dirty, error) and a
//! rule chain run by the validation pipeline; async validators resolve in any
//! order without ever overwriting a newer result. Field arrays keep entry
//! identities across reordering, submits run a single guarded lifecycle, and
//! subscribers receive one coalesced update per logical change.

pub mod definition;
mod domain;
mod form;
pub mod io;
mod validation;

pub use definition::{FormDefinition, load_definition, parse_definition};
pub use domain::{
    AsyncValidatorFn, FieldPath, FieldRules, ItemRules, Rule, RuleOutcome, Segment, Stage,
    SyncValidatorFn,
};
pub use form::{
    ArrayEntry, FieldArray, FieldState, FormEngine, FormError, FormOptions, FormPhase,
    FormSnapshot, FormUpdate, NodeId, ResetOptions, RevalidateMode, Selector, SetValueOptions,
    StableId, StateDiff, SubmitOutcome, Subscription, ValidationMode,
};
pub use io::{DocumentFormat, OutputDestination, OutputOptions};
pub use validation::{ErrorInfo, ErrorKind, JsonSchemaAdapter, SchemaAdapter, SchemaReport, Validation};

pub mod prelude {
    pub use super::{
        ErrorInfo, ErrorKind, FieldRules, FormEngine, FormOptions, FormPhase, ItemRules,
        ResetOptions, Selector, SetValueOptions, SubmitOutcome,
    };
}
