//! Reading and writing the documents around a form: definitions and values
//! in, snapshots out.

mod format;
mod input;
mod output;

pub use format::DocumentFormat;
pub use input::{parse_document_any, parse_document_as, parse_document_str};
pub use output::{OutputDestination, OutputOptions, emit, render};
