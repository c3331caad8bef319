use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use darbar_core::error::DomainError;

/// HTTP-facing error for the REST mirror surface.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    TooManyRequests(String),
    Unavailable(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::TooManyRequests(m)
            | Self::Unavailable(m) => write!(f, "{m}"),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let msg = err.to_string();
        match err {
            DomainError::RoomNotFound | DomainError::NotMember => Self::NotFound(msg),
            DomainError::GameInProgress
            | DomainError::RoomFull
            | DomainError::WrongPlayerCount { .. }
            | DomainError::PlayersNotReady
            | DomainError::GameNotActive
            | DomainError::InvalidPhase { .. } => Self::Conflict(msg),
            DomainError::PrivateRoomDenied
            | DomainError::Unauthorized
            | DomainError::NotHost
            | DomainError::NotSipahi
            | DomainError::NotAuthorizedToEndRound => Self::Forbidden(msg),
            DomainError::Storage(_) => Self::Unavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Self::TooManyRequests(m) => (StatusCode::TOO_MANY_REQUESTS, m.clone()),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_expected_classes() {
        assert!(matches!(
            AppError::from(DomainError::RoomNotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(DomainError::RoomFull),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(DomainError::NotHost),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            AppError::from(DomainError::Storage("down".into())),
            AppError::Unavailable(_)
        ));
    }
}
