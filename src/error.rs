use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;
use crate::services::eligibility::Ineligibility;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Nicht angemeldet")]
    Unauthorized,

    #[error("Keine Berechtigung")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Spiel hat bereits begonnen")]
    GameStarted,

    #[error("{0}")]
    Ineligible(Ineligibility),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::GameStarted | AppError::Ineligible(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Ineligibility> for AppError {
    fn from(reason: Ineligibility) -> Self {
        AppError::Ineligible(reason)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection);
        AppError::BadRequest("Ungültige Anfrage".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internals are logged, never echoed to the client
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Server-Fehler".to_string()
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
            self.to_string()
        };

        (status, Json(ApiResponse::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::GameStarted.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(Ineligibility::UsedAsLoser).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("Spiel nicht gefunden").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn ineligibility_messages_are_distinct() {
        let loser = AppError::from(Ineligibility::UsedAsLoser).to_string();
        let twice = AppError::from(Ineligibility::WinnerLimitReached).to_string();
        assert!(loser.contains("Verlierer"));
        assert!(twice.contains("zweimal"));
    }
}
