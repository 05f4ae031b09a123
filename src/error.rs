//! Error types for the PCS driver

use std::fmt;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the PCS driver
#[derive(Debug)]
pub enum Error {
    /// IO errors (process spawn, pipes)
    Io(std::io::Error),
    /// External tool output was not valid JSON
    Parse(String),
    /// External tool output was JSON of an unexpected shape
    Protocol(String),
    /// External tool wrote more than the output ceiling to stdout
    OutputLimit { limit: usize },
    /// No table identifier was supplied
    MissingTable,
    /// A view-required query option is absent
    MissingQuerySpec(String),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Column metadata lookup failed
    Metadata(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Parse(msg) => write!(f, "Error parsing JSON: {}", msg),
            Error::Protocol(msg) => write!(f, "Unexpected tool output: {}", msg),
            Error::OutputLimit { limit } => {
                write!(f, "Tool output exceeded the {} byte limit", limit)
            }
            Error::MissingTable => write!(f, "No table supplied"),
            Error::MissingQuerySpec(what) => write!(f, "Query spec is missing {}", what),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Metadata(msg) => write!(f, "Metadata error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error {
    /// Short, stable label used as a telemetry attribute.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Parse(_) => "parse",
            Error::Protocol(_) => "protocol",
            Error::OutputLimit { .. } => "output_limit",
            Error::MissingTable => "missing_table",
            Error::MissingQuerySpec(_) => "missing_query_spec",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Metadata(_) => "metadata",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
