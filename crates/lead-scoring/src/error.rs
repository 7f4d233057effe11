use crate::config::ConfigError;
use crate::leads::{AreaError, ScoringError};
use crate::logging::LoggingError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Logging(LoggingError),
    Io(std::io::Error),
    Server(axum::Error),
    Storage(AreaError),
    Scoring(ScoringError),
    Blocking(tokio::task::JoinError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Logging(err) => write!(f, "logging error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Storage(err) => write!(f, "storage error: {}", err),
            AppError::Scoring(err) => write!(f, "scoring error: {}", err),
            AppError::Blocking(err) => write!(f, "blocking task failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Logging(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Scoring(err) => Some(err),
            AppError::Blocking(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Storage(AreaError::QuotaExceeded { .. }) => StatusCode::INSUFFICIENT_STORAGE,
            AppError::Storage(AreaError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Scoring(
                ScoringError::UnknownTrigger(_) | ScoringError::ReservedTrigger(_),
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Scoring(ScoringError::UnknownAssessment(_)) => StatusCode::NOT_FOUND,
            AppError::Config(_)
            | AppError::Logging(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for AppError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<AreaError> for AppError {
    fn from(value: AreaError) -> Self {
        Self::Storage(value)
    }
}

impl From<ScoringError> for AppError {
    fn from(value: ScoringError) -> Self {
        Self::Scoring(value)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Blocking(value)
    }
}
