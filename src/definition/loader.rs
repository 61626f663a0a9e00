use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::debug;

use crate::io::{DocumentFormat, parse_document_any, parse_document_as};

use super::FormDefinition;

/// Parse a definition document. Falls back to the other available formats
/// when `format` does not parse.
pub fn parse_definition(contents: &str, format: DocumentFormat) -> Result<FormDefinition> {
    match parse_document_as(contents, format) {
        Ok(definition) => Ok(definition),
        Err(primary) => {
            let value = parse_document_any(contents, format).map_err(|_| primary)?;
            serde_json::from_value(value).context("document is not a valid form definition")
        }
    }
}

/// Read a definition file; the format follows the file extension (JSON when
/// unknown).
pub fn load_definition(path: impl AsRef<Path>) -> Result<FormDefinition> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read form definition {}", path.display()))?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentFormat::from_extension)
        .unwrap_or_default();
    debug!("loading form definition {} as {format}", path.display());
    parse_definition(&contents, format)
        .with_context(|| format!("invalid form definition {}", path.display()))
}
