use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::DocumentFormat;

/// Parses a document into a value tree.
pub fn parse_document_str(contents: &str, format: DocumentFormat) -> Result<Value> {
    let parsed: Result<Value> = match format {
        DocumentFormat::Json => serde_json::from_str(contents).map_err(Into::into),
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => serde_yaml::from_str(contents).map_err(Into::into),
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => toml::from_str::<toml::Table>(contents)
            .map_err(anyhow::Error::from)
            .and_then(|table| serde_json::to_value(table).map_err(Into::into)),
    };
    parsed.with_context(|| format!("failed to parse {} document", format.name().to_uppercase()))
}

/// Parses a document and deserializes it into `T`.
pub fn parse_document_as<T: DeserializeOwned>(contents: &str, format: DocumentFormat) -> Result<T> {
    let value = parse_document_str(contents, format)?;
    serde_json::from_value(value).with_context(|| format!("{format} document has an unexpected shape"))
}

/// Tries `preferred` first, then every other available format. When nothing
/// parses, the error of `preferred` is returned.
pub fn parse_document_any(contents: &str, preferred: DocumentFormat) -> Result<Value> {
    let primary = match parse_document_str(contents, preferred) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    DocumentFormat::available_formats()
        .into_iter()
        .filter(|candidate| *candidate != preferred)
        .find_map(|candidate| parse_document_str(contents, candidate).ok())
        .ok_or(primary)
}
