use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("already following this user")] DuplicateEdge,
    #[error("conflict")] Conflict,
    #[error("{0}")] Validation(String),
    #[error("{0}")] Integrity(String),
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::DuplicateEdge => ApiError::DuplicateEdge,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Validation(m) => ApiError::Validation(m),
            RepoError::Integrity(m) => ApiError::Integrity(m),
            RepoError::Internal(m) => {
                log::error!("repository failure: {m}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::DuplicateEdge | ApiError::Conflict | ApiError::Integrity(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
