use std::fmt;

/// Document formats understood by the definition loader and the snapshot
/// writer. JSON is always compiled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    #[default]
    Json,
    #[cfg(feature = "yaml")]
    Yaml,
    #[cfg(feature = "toml")]
    Toml,
}

impl DocumentFormat {
    /// Formats compiled into this build, JSON first.
    pub fn available_formats() -> Vec<DocumentFormat> {
        let mut formats = vec![DocumentFormat::Json];
        #[cfg(feature = "yaml")]
        formats.push(DocumentFormat::Yaml);
        #[cfg(feature = "toml")]
        formats.push(DocumentFormat::Toml);
        formats
    }

    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            #[cfg(feature = "yaml")]
            DocumentFormat::Yaml => "yaml",
            #[cfg(feature = "toml")]
            DocumentFormat::Toml => "toml",
        }
    }

    /// File extensions claimed by the format, canonical one first.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            DocumentFormat::Json => &["json"],
            #[cfg(feature = "yaml")]
            DocumentFormat::Yaml => &["yaml", "yml"],
            #[cfg(feature = "toml")]
            DocumentFormat::Toml => &["toml"],
        }
    }

    pub fn from_extension(extension: &str) -> Option<DocumentFormat> {
        let extension = extension.to_ascii_lowercase();
        Self::available_formats()
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
