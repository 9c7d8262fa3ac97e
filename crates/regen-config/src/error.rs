//! Errors from reading and writing `config.ron`.

use thiserror::Error;

/// Why the server configuration could not be loaded or stored.
///
/// A load failure at startup is not fatal: the binary falls back to the
/// built-in defaults and logs the error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `config.ron` exists but could not be read.
    #[error("cannot read config.ron: {0}")]
    ReadError(#[source] std::io::Error),

    /// The config directory or `config.ron` could not be written.
    #[error("cannot write config.ron: {0}")]
    WriteError(#[source] std::io::Error),

    /// `config.ron` is not a valid server configuration.
    #[error("invalid config.ron: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// The in-memory configuration could not be encoded.
    #[error("cannot encode configuration: {0}")]
    SerializeError(#[source] ron::Error),
}

#[cfg(test)]
mod tests {
    use crate::Config;

    use super::*;

    #[test]
    fn test_invalid_file_names_the_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "(scheduler: (tick_interval_ms: \"fast\"))")
            .unwrap();

        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert!(err.to_string().starts_with("invalid config.ron:"));
    }
}
