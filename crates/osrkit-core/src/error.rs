//! Error types for library acquisition and vendor calls.

use thiserror::Error;

/// Errors raised while loading the plugin chain or calling into it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No candidate location yielded an openable library.
    #[error("library {name} not found (tried {}): {last_error}", .attempted.join(", "))]
    NotFound {
        /// Name that was actually opened (after redirection).
        name: String,
        /// Every candidate tried, in order.
        attempted: Vec<String>,
        /// Platform error text of the last attempt.
        last_error: String,
    },

    /// A required entry point is missing from an otherwise opened library.
    #[error("required symbol missing: {0}")]
    MissingRequiredSymbol(String),

    /// The vendor init or setup call failed or unwound.
    #[error("vendor initialization failed: {0}")]
    VendorInitFailed(String),

    /// An execute call was attempted outside the Ready state.
    #[error("plugin session is not ready")]
    NotReady,

    /// A vendor execute call reported failure.
    #[error("vendor call failed: {0}")]
    CallFailed(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors raised while reading or validating a [`crate::config::LoaderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
