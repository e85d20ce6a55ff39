use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemInfo<'a> {
    pub environment: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Health<'a> {
    pub status: &'static str,
    pub system_info: SystemInfo<'a>,
}

pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config();
    Json(Health {
        status: "available",
        system_info: SystemInfo {
            environment: &config.environment,
            version: &config.version,
        },
    })
    .into_response()
}
