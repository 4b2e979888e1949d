use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErbarioError {
    #[error("API error: {0}")]
    Api(#[from] crate::api::ApiError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ErbarioError>;
