use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ferrogate_core::ValidationError),

    #[error(transparent)]
    Config(#[from] ferrogate_core::ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 6,
            Self::Logging(_) => 7,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_have_their_own_exit_code() {
        let error = CliError::from(ferrogate_core::ConfigError::MissingEnvVar(
            "TWELVEDATA_API_KEY",
        ));
        assert_eq!(error.exit_code(), 6);
        assert!(error.to_string().contains("TWELVEDATA_API_KEY"));
    }

    #[test]
    fn validation_errors_are_usage_errors() {
        let error = CliError::from(ferrogate_core::ValidationError::EmptySymbol);
        assert_eq!(error.exit_code(), 2);
    }
}
