use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    Json,
};
use cinedex_dal::Error as DalError;
use http::StatusCode;
use serde_json::json;
use tracing::{debug, error};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Field name to message, the body of 422 responses.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Data error: {0}")]
    Dal(#[from] DalError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid query: {0:?}")]
    InvalidQuery(FieldErrors),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),
}

fn report_to_fields(report: &garde::Report) -> FieldErrors {
    let mut fields = FieldErrors::new();
    for (path, error) in report.iter() {
        fields
            .entry(path.to_string())
            .or_insert_with(|| error.message().to_string());
    }
    fields
}

fn error_response(status: StatusCode, error: serde_json::Value) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dal(DalError::RecordNotFound(what)) => {
                debug!("Not found: {what}");
                error_response(
                    StatusCode::NOT_FOUND,
                    json!("the requested resource could not be found"),
                )
            }
            ApiError::ResourceNotFound => error_response(
                StatusCode::NOT_FOUND,
                json!("the requested resource could not be found"),
            ),
            ApiError::MethodNotAllowed => error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                json!("the method is not supported for this resource"),
            ),
            ApiError::Dal(DalError::EditConflict { id, version }) => {
                debug!("Edit conflict on movie {id} version {version}");
                error_response(
                    StatusCode::CONFLICT,
                    json!("unable to update the record due to an edit conflict, please try again"),
                )
            }
            ApiError::Dal(DalError::Validation(report)) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, json!(report_to_fields(&report)))
            }
            ApiError::Dal(DalError::InvalidOrderByField(_)) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "sort": "invalid sort value" }),
            ),
            ApiError::InvalidQuery(fields) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, json!(fields))
            }
            ApiError::InvalidRequest(msg) => error_response(StatusCode::BAD_REQUEST, json!(msg)),
            ApiError::Json(rejection) => {
                error_response(StatusCode::BAD_REQUEST, json!(rejection.body_text()))
            }
            ApiError::Dal(e) if e.is_transient() => {
                error!("Database temporarily unavailable: {e}");
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!("the server is temporarily unable to handle your request, please try again later"),
                )
            }
            ApiError::Dal(e) => {
                error!("Server error: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("the server encountered a problem and could not process your request"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::Dal(DalError::RecordNotFound("Movie 1".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Dal(DalError::EditConflict { id: 1, version: 1 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Dal(DalError::DeadlineExceeded(Duration::from_secs(3))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Dal(DalError::AcquireTimeout),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Dal(DalError::InvalidOrderByField("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Dal(DalError::Database(sqlx::Error::RowNotFound)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::InvalidRequest("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
