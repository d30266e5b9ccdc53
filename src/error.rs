use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Validation failed: {}", errors.join(", "))]
    Validation { errors: Vec<String> },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request cancelled during {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyticsError {
    pub fn validation(error: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![error.into()],
        }
    }

    /// HTTP-equivalent status for the handler that wraps the engine.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Serialization(_) => 400,
            Self::Cancelled(_) => 408,
            Self::DataSource(_) => 422,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
