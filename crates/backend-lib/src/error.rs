// ============================
// crates/backend-lib/src/error.rs
// ============================
//! Central error type + Axum integration.
//!
//! Domain failures (authorization, validation, missing rooms) are not
//! errors here: the protocol treats them as silent no-ops. `AppError`
//! covers infrastructure faults only.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Room has ended")]
    RoomClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RoomClosed => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::RoomClosed => "ROOM_001",
            AppError::Config(_) => "CFG_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Message safe to expose outside debug builds.
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::RoomClosed => "Room has ended".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
            _ => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Failed to send message".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn display_formatting() {
        let io_error = AppError::Io(IoError::new(ErrorKind::NotFound, "missing"));
        assert!(io_error.to_string().contains("IO error"));
        assert_eq!(AppError::RoomClosed.to_string(), "Room has ended");
    }

    #[test]
    fn status_codes() {
        assert_eq!(AppError::RoomClosed.status_code(), StatusCode::GONE);
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        assert_eq!(
            AppError::Json(json_err).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(AppError::RoomClosed.error_code(), "ROOM_001");
        assert_eq!(AppError::Config("bad".into()).error_code(), "CFG_001");
    }

    #[test]
    fn into_response_sets_status_and_content_type() {
        let response = AppError::RoomClosed.into_response();
        assert_eq!(response.status(), StatusCode::GONE);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }

    #[test]
    fn from_send_error() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
        drop(rx);
        let err: AppError = tx.send(1).unwrap_err().into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
