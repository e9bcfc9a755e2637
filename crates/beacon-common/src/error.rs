//! Error types shared across Beacon crates
//!
//! Component-local error enums (pipeline, connection, registry) live next to
//! the code that raises them; this module holds the errors raised while
//! loading and validating application configuration.

/// Application-level error types
#[derive(thiserror::Error, Debug)]
pub enum BeaconError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_error_display() {
        let err = BeaconError::IllegalArgument("bad host".to_string());
        assert_eq!(format!("{}", err), "caused: bad host");

        let err = BeaconError::ConfigError("missing file".to_string());
        assert_eq!(format!("{}", err), "configuration error: missing file");
    }
}
