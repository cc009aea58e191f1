use std::io;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// Path to the config file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path to the config file that failed to parse.
        path: String,
        /// Underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("validation error in field '{field}': {message}")]
    ValidationError {
        /// Field that failed validation.
        field: String,
        /// Validation failure description.
        message: String,
    },

    /// Environment variable error.
    #[error("environment variable '{var_name}': {message}")]
    EnvError {
        /// Name of the environment variable.
        var_name: String,
        /// Error description.
        message: String,
    },

    /// Could not determine home directory.
    #[error("could not determine home directory")]
    NoHomeDir,

    /// A plugin schema declaration was rejected.
    #[error("invalid schema for '{namespace}': {message}")]
    InvalidSchema {
        /// Plugin namespace.
        namespace: String,
        /// What is wrong.
        message: String,
    },

    /// The plugin never declared a schema.
    #[error("no config schema declared for '{0}'")]
    UnknownNamespace(String),

    /// The key is not part of the plugin's schema.
    #[error("'{key}' is not a declared config field of '{namespace}'")]
    UnknownKey {
        /// Plugin namespace.
        namespace: String,
        /// Offending key.
        key: String,
    },

    /// The value does not match the declared field type.
    #[error("config field '{key}' expects a {expected}")]
    TypeMismatch {
        /// Field key.
        key: String,
        /// Declared type name.
        expected: &'static str,
    },

    /// Internal store failure.
    #[error("internal config store error: {0}")]
    Internal(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
