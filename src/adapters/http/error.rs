use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::errors::DomainError;

/// Envoltorio HTTP de `DomainError`: cada fallo se convierte en un mensaje
/// visible para el usuario, nunca en una caída de la sesión.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::AuthFailure => (StatusCode::UNAUTHORIZED, "AUTH_FAILURE"),
            DomainError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            DomainError::ModelLoad { .. } => (StatusCode::SERVICE_UNAVAILABLE, "MODEL_LOAD_FAILURE"),
            DomainError::ImageDecode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "IMAGE_DECODE_FAILURE"),
            DomainError::StreamPermission(_) => (StatusCode::FORBIDDEN, "STREAM_PERMISSION_FAILURE"),
            DomainError::StreamFailure(_) => (StatusCode::BAD_GATEWAY, "STREAM_FAILURE"),
            DomainError::NoInput => (StatusCode::BAD_REQUEST, "NO_INPUT"),
            DomainError::InvalidSource => (StatusCode::BAD_REQUEST, "INVALID_SOURCE"),
            DomainError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DomainError::OperationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.0.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error_code, message = %message, "Request error");
        } else {
            tracing::warn!(status = %status, error_code, message = %message, "Request rejected");
        }

        (status, Json(json!({ "error_code": error_code, "message": message }))).into_response()
    }
}
