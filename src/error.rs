use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::auth::{removal_cookie, RegisterError};
use crate::draft::DraftError;
use crate::split::SplitError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error("not logged in")]
    Unauthenticated,

    #[error("draft not found")]
    DraftNotFound,

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error(transparent)]
    Api(ApiError),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AppError::Unauthenticated,
            other => AppError::Api(other),
        }
    }
}

impl From<SplitError> for AppError {
    fn from(err: SplitError) -> Self {
        AppError::Draft(DraftError::Split(err))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    difference: Option<f64>,
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Invalid(_) => "invalidInput",
            AppError::Unauthenticated => "unauthenticated",
            AppError::DraftNotFound => "draftNotFound",
            AppError::Draft(err) => match err {
                DraftError::MissingTitle => "missingTitle",
                DraftError::NotCustom => "notCustom",
                DraftError::NotValidated => "notValidated",
                DraftError::Closed => "draftClosed",
                DraftError::Submitting => "draftSubmitting",
                DraftError::Split(SplitError::InvalidAmount) => "invalidAmount",
                DraftError::Split(SplitError::MissingGroup) => "missingGroup",
                DraftError::Split(SplitError::SplitMismatch { .. }) => "splitMismatch",
                DraftError::Split(SplitError::UnknownMember(_)) => "unknownMember",
            },
            AppError::Register(RegisterError::PasswordMismatch) => "passwordMismatch",
            AppError::Register(RegisterError::PasswordTooShort) => "passwordTooShort",
            AppError::Api(ApiError::Transport(_)) => "backendUnavailable",
            AppError::Api(_) => "upstream",
            AppError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Invalid(_) | AppError::Register(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::Api(ApiError::Unauthorized) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::DraftNotFound => StatusCode::NOT_FOUND,
            AppError::Draft(
                DraftError::NotCustom
                | DraftError::NotValidated
                | DraftError::Closed
                | DraftError::Submitting,
            ) => StatusCode::CONFLICT,
            AppError::Draft(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Api(ApiError::Status { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Api(ApiError::Transport(_)) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (total, assigned, difference) = match self {
            AppError::Draft(DraftError::Split(err @ SplitError::SplitMismatch { total, assigned })) => {
                (Some(*total), Some(*assigned), err.difference())
            }
            _ => (None, None, None),
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            total,
            assigned,
            difference,
        };

        let mut response = HttpResponse::build(self.status_code());
        if self.status_code() == StatusCode::UNAUTHORIZED {
            response.cookie(removal_cookie());
        }
        response.json(body)
    }
}
