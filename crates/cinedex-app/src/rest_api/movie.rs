use axum::{
    extract::{rejection::JsonRejection, Path},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json,
};
use axum_valid::Garde;
use cinedex_dal::{Error as DalError, Movie, MovieRepository, Runtime};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    rest_api::{read_id, ListParams},
    state::AppState,
};

crate::repository_from_request!(MovieRepository);

pub const EXPECTED_VERSION_HEADER: &str = "X-Expected-Version";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovie {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update, absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl UpdateMovie {
    fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

fn expected_version(headers: &HeaderMap) -> ApiResult<Option<i32>> {
    headers
        .get(EXPECTED_VERSION_HEADER)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<i32>().ok())
                .ok_or_else(|| {
                    ApiError::InvalidRequest(format!(
                        "{EXPECTED_VERSION_HEADER} header must be an integer"
                    ))
                })
        })
        .transpose()
}

pub async fn create(
    repository: MovieRepository,
    payload: Result<Json<CreateMovie>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    let mut movie = Movie::new(input.title, input.year, input.runtime, input.genres);
    repository.insert(&mut movie).await?;
    debug!("Created movie {}", movie.id);

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

pub async fn list(
    repository: MovieRepository,
    Garde(axum::extract::Query(params)): Garde<axum::extract::Query<ListParams>>,
) -> ApiResult<impl IntoResponse> {
    let listing = params.into_listing()?;
    let (movies, metadata) = repository
        .list(&listing.title, &listing.genres, &listing.filters)
        .await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub async fn get_movie(
    Path(id): Path<String>,
    repository: MovieRepository,
) -> ApiResult<impl IntoResponse> {
    let id = read_id(&id)?;
    let movie = repository.get(id).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn update(
    Path(id): Path<String>,
    repository: MovieRepository,
    headers: HeaderMap,
    payload: Result<Json<UpdateMovie>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = read_id(&id)?;
    let expected = expected_version(&headers)?;
    let Json(changes) = payload?;

    let mut movie = repository.get(id).await?;
    if let Some(version) = expected {
        if version != movie.version {
            return Err(DalError::EditConflict { id, version }.into());
        }
    }
    changes.apply(&mut movie);
    repository.update(&mut movie).await?;
    debug!("Updated movie {id} to version {}", movie.version);

    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete(
    Path(id): Path<String>,
    repository: MovieRepository,
) -> ApiResult<impl IntoResponse> {
    let id = read_id(&id)?;
    repository.delete(id).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_movie).patch(update).delete(delete))
}
