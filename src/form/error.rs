/// Programmer errors surfaced by the engine.
///
/// Field validation failures are not errors in this sense; they live on the
/// field as [`crate::ErrorInfo`]. These signal misuse of the API and are
/// returned immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    /// The path was never registered and addresses no registered field.
    #[error("unknown field path '{path}'")]
    UnknownFieldPath { path: String },

    /// The path text could not be parsed.
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// An array position outside the current bounds.
    #[error("index {index} out of range for field array '{array}' of length {len}")]
    IndexOutOfRange {
        array: String,
        index: usize,
        len: usize,
    },

    /// The value at the path exists but is not an array.
    #[error("value at '{path}' is not an array")]
    NotAnArray { path: String },
}

impl FormError {
    pub fn unknown(path: impl ToString) -> Self {
        Self::UnknownFieldPath {
            path: path.to_string(),
        }
    }
}
