use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn forbidden(message: &str) -> Self {
        ApiError::Forbidden("FORBIDDEN", message.into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{what} not found"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", message.into())
    }

    pub fn invalid_range() -> Self {
        ApiError::BadRequest(
            "INVALID_RANGE",
            "at least one shift range with start before end is required".into(),
        )
    }

    pub fn date_month_mismatch(token: &str) -> Self {
        ApiError::BadRequest(
            "DATE_MONTH_MISMATCH",
            format!("date {token} does not fall in the selected month"),
        )
    }

    pub fn duplicate_schedule() -> Self {
        ApiError::Conflict(
            "DUPLICATE_SCHEDULE",
            "the doctor already has a schedule for the selected month".into(),
        )
    }

    pub fn schedule_has_held_slots() -> Self {
        ApiError::Conflict(
            "SCHEDULE_HAS_HELD_SLOTS",
            "the schedule has at least one reserved slot".into(),
        )
    }

    pub fn slot_not_found() -> Self {
        ApiError::NotFound("SLOT_NOT_FOUND", "slot not found".into())
    }

    pub fn slot_already_held() -> Self {
        ApiError::Conflict("SLOT_ALREADY_HELD", "the slot is no longer available".into())
    }

    pub fn already_terminal() -> Self {
        ApiError::Conflict(
            "ALREADY_TERMINAL",
            "the appointment is already attended or cancelled".into(),
        )
    }

    pub fn wrong_state() -> Self {
        ApiError::Conflict(
            "WRONG_STATE",
            "the appointment is not in a state that allows this action".into(),
        )
    }

    pub fn db(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }

    /// Stable machine code, mostly for assertions in tests.
    pub fn code(&self) -> &str {
        match self {
            ApiError::Unauthorized(code, _)
            | ApiError::Forbidden(code, _)
            | ApiError::BadRequest(code, _)
            | ApiError::NotFound(code, _)
            | ApiError::Conflict(code, _) => code,
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", "internal error"),
                )
                    .into_response()
            }
        }
    }
}
