mod error;
mod pipeline;
mod schema;

pub use error::{ErrorInfo, ErrorKind};
pub use pipeline::Validation;
pub use schema::{JsonSchemaAdapter, SchemaAdapter, SchemaReport};
