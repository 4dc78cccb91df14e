use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a Kiln configuration
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Error reading configuration {0}: {1}")]
    #[diagnostic(
        code("KILN-CFG-001"),
        help("Check that the file exists and has proper permissions")
    )]
    Read(PathBuf, String),

    /// The configuration is not valid TOML or has the wrong shape
    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code("KILN-CFG-002"),
        help("Check your kiln.toml syntax; every section and field is optional")
    )]
    Parse(String),

    /// The configuration parsed but holds an unusable value
    #[error("Invalid configuration value: {0}")]
    #[diagnostic(code("KILN-CFG-003"))]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
