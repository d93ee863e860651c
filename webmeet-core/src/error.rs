use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Media server error: {0}")]
    Sfu(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Short label used for metrics and structured logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::Sfu(_) => "sfu",
            Self::Timeout(_) => "timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::Sfu("boom".into()).kind(), "sfu");
        assert_eq!(
            Error::Sfu("session expired".into()).to_string(),
            "Media server error: session expired"
        );
    }
}
