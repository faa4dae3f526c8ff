use spin_sdk::http::Response;
use thiserror::Error;

use crate::templates;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::Conflict(_) => 409,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        let html = match &err {
            ApiError::NotFound(path) => templates::render_not_found(path),
            other => templates::render_error(status, &other.to_string()),
        };
        match html {
            Ok(body) => Response::builder()
                .status(status)
                .header("Content-Type", "text/html; charset=utf-8")
                .body(body)
                .build(),
            Err(e) => {
                tracing::error!(error = %e, "failed to render error page");
                Response::builder()
                    .status(status)
                    .header("Content-Type", "text/plain; charset=utf-8")
                    .body(err.to_string())
                    .build()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
