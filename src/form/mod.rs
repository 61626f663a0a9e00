mod array;
mod bus;
pub(crate) mod engine;
mod error;
pub(crate) mod node;
mod options;
pub(crate) mod registry;
mod state;
mod tree;

pub use array::{ArrayEntry, FieldArray, StableId};
pub use bus::{FormUpdate, Selector, StateDiff, Subscription};
pub use engine::FormEngine;
pub use error::FormError;
pub use node::{FieldState, NodeId};
pub use options::{FormOptions, ResetOptions, RevalidateMode, SetValueOptions, ValidationMode};
pub use state::{FormPhase, FormSnapshot, SubmitOutcome};
