//! Error types shared by the loader, the reconciliation engine and the exporters.

use std::path::PathBuf;

use thiserror::Error;

use crate::markup::MarkupError;

/// Result type used across the crate.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Every failure the corpus tooling can surface.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// A line carries entity markup that does not parse.
    #[error("{file}:{line}: {source}")]
    Markup {
        file: String,
        line: usize,
        #[source]
        source: MarkupError,
    },

    /// File name does not follow `<category>_<serial>.txt`.
    #[error("file name {0:?} does not match <category>_<serial>.txt")]
    FileNaming(String),

    /// Output directory already has content.
    #[error("output directory not empty: {}", .0.display())]
    DestinationNotEmpty(PathBuf),

    /// Output file already exists, or two outputs would share one path.
    #[error("output target exists: {}", .0.display())]
    DestinationConflict(PathBuf),

    /// Knowledge-base query failed.
    #[error("knowledge base unavailable: {0}")]
    ResolverUnavailable(String),

    /// Knowledge base answered without an entry for a requested title.
    #[error("knowledge base returned no resolution for {0:?}")]
    MissingResolution(String),

    /// Interactive input ended before a valid answer was given.
    #[error("input closed while waiting for an answer")]
    InputClosed,

    /// Invalid argument values.
    #[error("{0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CorpusError {
    /// Create an invalid-argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a resolver error from any displayable cause.
    pub fn resolver(cause: impl std::fmt::Display) -> Self {
        Self::ResolverUnavailable(cause.to_string())
    }

    /// Get the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Usage errors: 1
            Self::InvalidArgument(_) | Self::InputClosed => 1,
            // Dataset errors: 2
            Self::Markup { .. } | Self::FileNaming(_) => 2,
            // Destination errors: 3
            Self::DestinationNotEmpty(_) | Self::DestinationConflict(_) => 3,
            // Knowledge base errors: 4
            Self::ResolverUnavailable(_) | Self::MissingResolution(_) => 4,
            // Config errors: 5
            Self::Config(_) | Self::Toml(_) => 5,
            // IO and format errors: 6
            Self::Io(_) | Self::Json(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_error_names_location() {
        let err = CorpusError::Markup {
            file: "news_1.txt".to_string(),
            line: 3,
            source: MarkupError::MalformedEntity {
                markup: "{{a|b}}".to_string(),
                fields: 2,
            },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("news_1.txt:3: "));
        assert!(msg.contains("{{a|b}}"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes_are_grouped() {
        assert_eq!(CorpusError::InputClosed.exit_code(), 1);
        assert_eq!(
            CorpusError::DestinationNotEmpty(PathBuf::from("out")).exit_code(),
            CorpusError::DestinationConflict(PathBuf::from("out.json")).exit_code()
        );
        assert_eq!(CorpusError::resolver("timeout").exit_code(), 4);
        assert_eq!(
            CorpusError::resolver("timeout").to_string(),
            "knowledge base unavailable: timeout"
        );
    }
}
