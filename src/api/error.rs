//! Error taxonomy for calls against the Escomunidad API.

use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::session::ClaimsError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The API answered with a non-success status. The payload is kept
    /// verbatim so validation and detail messages can be shown to the user.
    #[error("the API rejected the request with status {status}")]
    Status { status: StatusCode, payload: Value },

    /// The refresh token was rejected (or a refreshed token still failed):
    /// the session has been torn down and the user must log in again.
    #[error("the session expired and could not be refreshed; log in again")]
    SessionExpired,

    #[error("the API could not be reached")]
    Transport(#[from] reqwest::Error),

    #[error("the received token is not a decodable JWT")]
    InvalidToken(#[from] ClaimsError),

    #[error("failed to persist the session")]
    SessionStorage(#[source] anyhow::Error),
}

impl ApiError {
    /// Build an error from a non-success response, preserving the body as
    /// JSON when possible and as plain text otherwise.
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str(&text).unwrap_or(Value::String(text));
        ApiError::Status { status, payload }
    }

    /// Field-level validation errors in the DRF shape
    /// `{"campo": ["mensaje", ...]}`. Empty for every other error kind.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let ApiError::Status { status, payload } = self else {
            return Vec::new();
        };
        if *status != StatusCode::BAD_REQUEST {
            return Vec::new();
        }
        let Value::Object(map) = payload else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for (field, messages) in map {
            match messages {
                Value::Array(items) => {
                    for item in items {
                        if let Value::String(message) = item {
                            errors.push((field.clone(), message.clone()));
                        }
                    }
                }
                Value::String(message) => errors.push((field.clone(), message.clone())),
                _ => {}
            }
        }
        errors
    }

    /// The human-readable `detail` message DRF attaches to most rejections.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { payload, .. } => match payload {
                Value::Object(map) => map.get("detail").and_then(Value::as_str),
                Value::String(text) if !text.is_empty() => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
