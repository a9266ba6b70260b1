use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<daqg_engine::EngineError> for ApiError {
    fn from(e: daqg_engine::EngineError) -> Self {
        match e {
            daqg_engine::EngineError::ReconcileBusy => ApiError::conflict(e.to_string()),
            daqg_engine::EngineError::UnknownSource(_) => ApiError::not_found(e.to_string()),
            daqg_engine::EngineError::Config(_) | daqg_engine::EngineError::Domain(_) => {
                ApiError::bad_request(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<daqg_config::ConfigError> for ApiError {
    fn from(e: daqg_config::ConfigError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<daqg_buffer::BufferError> for ApiError {
    fn from(e: daqg_buffer::BufferError) -> Self {
        ApiError::internal(e.to_string())
    }
}
