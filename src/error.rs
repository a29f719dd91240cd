use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::gateway::GatewayError;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Everything a handler can surface to a client. Store and gateway failures
/// collapse into `Internal`; the detail is logged, never sent over the wire.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unauthorized access")]
    Unauthorized,
    #[error("forbidden access")]
    Forbidden,
    #[error("bad request")]
    BadRequest,
    #[error("not found")]
    NotFound,
    #[error("internal error")]
    Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        log::error!("store error: {e}");
        ApiError::Internal
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        log::error!("payment gateway error: {e}");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
