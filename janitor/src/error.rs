use derive_more::derive::Display;
use reqwest::StatusCode;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Display)]
pub enum AppError {
    /// Network or auth failure talking to the mail store, the classifier backend or the token endpoint
    #[display("Transport error: {_0}")]
    Transport(String),
    RequestTimeout,
    TooManyRequests,
    /// Classifier output that does not fit the closed category set or the confidence bounds
    #[display("Validation error: {_0}")]
    Validation(String),
    #[display("Persistence error: {_0}")]
    Persistence(sea_orm::error::DbErr),
    #[display("Configuration error: {_0}")]
    Configuration(String),
    #[display("Internal error: {_0}")]
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

impl AppError {
    /// Transport-class failures: the request never produced a usable answer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::RequestTimeout | AppError::TooManyRequests
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Transport(_) | AppError::RequestTimeout | AppError::TooManyRequests => {
                "transport"
            }
            AppError::Validation(_) => "validation",
            AppError::Persistence(_) => "persistence",
            AppError::Configuration(_) => "configuration",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        match error.status() {
            Some(StatusCode::REQUEST_TIMEOUT) => AppError::RequestTimeout,
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::TooManyRequests,
            _ if error.is_timeout() => AppError::RequestTimeout,
            _ => AppError::Transport(error.to_string()),
        }
    }
}

impl From<sea_orm::error::DbErr> for AppError {
    fn from(error: sea_orm::error::DbErr) -> Self {
        AppError::Persistence(error)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Configuration(error.to_string())
    }
}

/// Map a non-success HTTP status from a remote API into the error taxonomy
pub fn status_error(status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::REQUEST_TIMEOUT => AppError::RequestTimeout,
        StatusCode::TOO_MANY_REQUESTS => AppError::TooManyRequests,
        _ => AppError::Transport(format!("{}: {}", status, body)),
    }
}
