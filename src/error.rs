use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no API key configured for {0}")]
    AuthenticationMissing(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// Raised while decoding a streamed body. Logged and dropped by the decoder.
    #[error("malformed stream line: {0}")]
    MalformedStreamLine(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        GatewayError::NotFound { entity, id }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::ProviderUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Storage(err.to_string())
    }
}
