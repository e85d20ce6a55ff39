pub mod movie;

use std::str::FromStr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use cinedex_dal::{filters::DEFAULT_PAGE_SIZE, Filters, SortKey};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult, FieldErrors},
    health,
    state::AppState,
};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Raw listing query, numbers are kept as text so that parse failures
/// can be reported per key.
#[derive(Debug, Clone, Default, Validate, Deserialize)]
#[garde(allow_unvalidated)]
pub struct ListParams {
    #[garde(length(max = 255))]
    pub title: Option<String>,
    #[garde(length(max = 1024))]
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    #[garde(length(max = 255))]
    pub sort: Option<String>,
}

pub struct Listing {
    pub title: String,
    pub genres: Vec<String>,
    pub filters: Filters,
}

fn parse_int<T: FromStr>(
    value: Option<&str>,
    key: &str,
    default: T,
    errors: &mut FieldErrors,
) -> T {
    match value.map(str::trim) {
        None | Some("") => default,
        Some(text) => text.parse().unwrap_or_else(|_| {
            errors.insert(key.to_string(), "must be an integer value".to_string());
            default
        }),
    }
}

impl ListParams {
    pub fn into_listing(self) -> ApiResult<Listing> {
        let mut errors = FieldErrors::new();
        let page = parse_int(self.page.as_deref(), "page", 1, &mut errors);
        let page_size = parse_int(
            self.page_size.as_deref(),
            "page_size",
            DEFAULT_PAGE_SIZE,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(ApiError::InvalidQuery(errors));
        }

        let genres = self
            .genres
            .map(|csv| {
                csv.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let sort = self
            .sort
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SortKey::default().to_string());

        Ok(Listing {
            title: self.title.unwrap_or_default(),
            genres,
            filters: Filters::new(page, page_size, sort),
        })
    }
}

/// Path ids are positive integers, anything else cannot name a movie.
pub fn read_id(raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::ResourceNotFound),
    }
}

async fn not_found() -> ApiError {
    ApiError::ResourceNotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .nest("/v1/movies", movie::router())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
