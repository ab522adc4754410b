use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::store::StoreError;

/// Message shown whenever a caller needs exemplars that are not there yet.
pub const EMPTY_CORPUS_MESSAGE: &str =
    "Brain is empty. Upload exemplar essays before generating or analysing.";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{EMPTY_CORPUS_MESSAGE}")]
    EmptyCorpus,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not parse model output: {0}")]
    Parse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Rate limited by the model provider after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Exemplar store write failed: {0}")]
    StoreWrite(String),

    #[error("Exemplar store read failed: {0}")]
    StoreRead(String),

    #[error("Could not ingest document: {0}")]
    Ingest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Blueprint write failed: {0}")]
    BlueprintWrite(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimitExhausted { attempts } => AppError::RateLimitExhausted { attempts },
            LlmError::EmptyContent => AppError::EmptyResponse,
            LlmError::Parse(e) => AppError::Parse(e.to_string()),
            LlmError::Provider(msg) => AppError::Generation(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if err.is_write() {
            AppError::StoreWrite(err.to_string())
        } else {
            AppError::StoreRead(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::EmptyCorpus => (
                StatusCode::BAD_REQUEST,
                "EMPTY_CORPUS",
                EMPTY_CORPUS_MESSAGE.to_string(),
            ),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    msg.clone(),
                )
            }
            AppError::Parse(msg) => {
                tracing::warn!("Model output rejected: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PARSE_ERROR",
                    "The model returned output that did not match the expected format".to_string(),
                )
            }
            AppError::EmptyResponse => (
                StatusCode::BAD_GATEWAY,
                "EMPTY_RESPONSE",
                "The model returned an empty response".to_string(),
            ),
            AppError::RateLimitExhausted { attempts } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RATE_LIMITED",
                format!(
                    "The model provider is rate limiting requests ({attempts} attempts). \
                     Try again later."
                ),
            ),
            AppError::Generation(msg) => {
                tracing::error!("Generation error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATION_ERROR",
                    "The model provider rejected the request".to_string(),
                )
            }
            AppError::StoreWrite(msg) => {
                tracing::error!("Store write error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_WRITE_ERROR",
                    "Could not write to the exemplar store".to_string(),
                )
            }
            AppError::StoreRead(msg) => {
                tracing::error!("Store read error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_READ_ERROR",
                    "Could not read the exemplar store".to_string(),
                )
            }
            AppError::Ingest(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INGEST_ERROR",
                msg.clone(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::BlueprintWrite(msg) => {
                tracing::error!("Blueprint write error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "BLUEPRINT_WRITE_ERROR",
                    "Could not save the style blueprint; the previous one is unchanged".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
