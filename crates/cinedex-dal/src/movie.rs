use std::{collections::HashSet, fmt, future::Future, time::Duration};

use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sqlx::{FromRow as _, QueryBuilder, Row as _, types::Json};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    ChosenDB, ChosenRow, DEFAULT_QUERY_TIMEOUT, Error, Pool,
    error::Result,
    filters::{Filters, Metadata},
};

pub const MAX_TITLE_BYTES: usize = 500;
pub const MAX_GENRES: usize = 5;
pub const MAX_GENRE_BYTES: usize = 255;
pub const FIRST_FILM_YEAR: i32 = 1888;

/// Running time in minutes, represented as `"<n> mins"` in JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Runtime {
    pub fn minutes(&self) -> i32 {
        self.0
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for Runtime {
    fn from(value: i32) -> Self {
        Runtime(value)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct RuntimeVisitor;

impl de::Visitor<'_> for RuntimeVisitor {
    type Value = Runtime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("runtime as \"<n> mins\" or integer")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        i32::try_from(v)
            .map(Runtime)
            .map_err(|_| E::custom("invalid runtime format"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i32::try_from(v)
            .map(Runtime)
            .map_err(|_| E::custom("invalid runtime format"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let number = v.strip_suffix(" mins").unwrap_or(v);
        number
            .parse::<i32>()
            .map(Runtime)
            .map_err(|_| E::custom("invalid runtime format"))
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RuntimeVisitor)
    }
}

fn validate_title(title: &str, _ctx: &()) -> garde::Result {
    if title.is_empty() {
        Err(garde::Error::new("must be provided"))
    } else if title.len() > MAX_TITLE_BYTES {
        Err(garde::Error::new("must not be more than 500 bytes long"))
    } else {
        Ok(())
    }
}

fn validate_year(year: &i32, _ctx: &()) -> garde::Result {
    if *year == 0 {
        Err(garde::Error::new("must be provided"))
    } else if *year < FIRST_FILM_YEAR {
        Err(garde::Error::new("must be greater than 1888"))
    } else if *year > OffsetDateTime::now_utc().year() {
        Err(garde::Error::new("must not be in the future"))
    } else {
        Ok(())
    }
}

fn validate_runtime(runtime: &Runtime, _ctx: &()) -> garde::Result {
    match runtime.0 {
        0 => Err(garde::Error::new("must be provided")),
        n if n < 0 => Err(garde::Error::new("must be a positive integer")),
        _ => Ok(()),
    }
}

fn validate_genres(genres: &[String], _ctx: &()) -> garde::Result {
    if genres.is_empty() {
        Err(garde::Error::new("must contain at least 1 genre"))
    } else if genres.len() > MAX_GENRES {
        Err(garde::Error::new("must not contain more than 5 genres"))
    } else if genres.iter().any(|g| g.is_empty()) {
        Err(garde::Error::new("must not contain empty values"))
    } else if genres.iter().any(|g| g.len() > MAX_GENRE_BYTES) {
        Err(garde::Error::new("must not contain values longer than 255 bytes"))
    } else if genres.iter().collect::<HashSet<_>>().len() != genres.len() {
        Err(garde::Error::new("must not contain duplicate values"))
    } else {
        Ok(())
    }
}

fn unset_created_at() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Movie {
    #[garde(skip)]
    #[serde(default)]
    pub id: i64,
    #[garde(skip)]
    #[serde(skip, default = "unset_created_at")]
    pub created_at: OffsetDateTime,
    #[garde(custom(validate_title))]
    pub title: String,
    #[garde(custom(validate_year))]
    #[serde(default, skip_serializing_if = "is_zero")]
    pub year: i32,
    #[garde(custom(validate_runtime))]
    #[serde(default, skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    #[garde(custom(validate_genres))]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[garde(skip)]
    #[serde(default)]
    pub version: i32,
}

impl Movie {
    /// Movie not yet stored, store assigned fields are left unset.
    pub fn new(
        title: impl Into<String>,
        year: i32,
        runtime: impl Into<Runtime>,
        genres: Vec<String>,
    ) -> Self {
        Movie {
            id: 0,
            created_at: unset_created_at(),
            title: title.into(),
            year,
            runtime: runtime.into(),
            genres,
            version: 0,
        }
    }
}

impl sqlx::FromRow<'_, ChosenRow> for Movie {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let genres: Json<Vec<String>> = row.try_get("genres")?;
        Ok(Movie {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
            runtime: Runtime(row.try_get("runtime")?),
            genres: genres.0,
            version: row.try_get("version")?,
        })
    }
}

enum TitleSearch {
    Any,
    Nothing,
    Match(String),
}

/// Turns free text into an FTS5 expression where every word must match.
/// Words are quoted so FTS operators in user input are matched literally.
fn title_search(search: &str) -> TitleSearch {
    if search.is_empty() {
        return TitleSearch::Any;
    }
    let terms = search
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>();
    if terms.is_empty() {
        TitleSearch::Nothing
    } else {
        TitleSearch::Match(terms.join(" "))
    }
}

const SELECT_MOVIE: &str = r#"
SELECT m.id AS id, m.created_at AS created_at, m.title AS title, m.year AS year,
m.runtime AS runtime, m.genres AS genres, m.version AS version
FROM movies m
WHERE m.id = ?
"#;

pub type MovieRepository = MovieRepositoryImpl<Pool>;

pub struct MovieRepositoryImpl<E> {
    executor: E,
    timeout: Duration,
}

impl<'c, E> MovieRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self::with_timeout(executor, DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_timeout(executor: E, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one database round trip under the repository deadline.
    /// Dropping the pending future on expiry releases its connection.
    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(sqlx::Error::PoolTimedOut)) => Err(Error::DeadlineExceeded(self.timeout)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                debug!("Database call exceeded deadline {:?}", self.timeout);
                Err(Error::DeadlineExceeded(self.timeout))
            }
        }
    }

    pub async fn insert(&self, movie: &mut Movie) -> Result<()> {
        movie.validate()?;
        let row = self
            .bounded(
                sqlx::query(
                    "INSERT INTO movies (title, year, runtime, genres) VALUES (?, ?, ?, ?)
                    RETURNING id, created_at, version",
                )
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(Json(&movie.genres))
                .fetch_one(&self.executor),
            )
            .await?;

        movie.id = row.try_get("id")?;
        movie.created_at = row.try_get("created_at")?;
        movie.version = row.try_get("version")?;
        debug!(id = movie.id, "Inserted movie");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Movie> {
        // ids start at 1, no need to ask the database
        if id < 1 {
            return Err(Error::RecordNotFound(format!("Movie {id}")));
        }

        self.bounded(
            sqlx::query_as::<_, Movie>(SELECT_MOVIE)
                .bind(id)
                .fetch_optional(&self.executor),
        )
        .await?
        .ok_or_else(|| Error::RecordNotFound(format!("Movie {id}")))
    }

    /// Lists movies matching all words of `search_title` (if not blank) and
    /// containing every genre in `genres` (if not empty).
    pub async fn list(
        &self,
        search_title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata)> {
        filters.validate()?;
        let sort = filters.sort_key()?;

        let mut query: QueryBuilder<ChosenDB> = QueryBuilder::new(
            "SELECT count(*) OVER() AS total_records, m.id AS id, m.created_at AS created_at, \
            m.title AS title, m.year AS year, m.runtime AS runtime, m.genres AS genres, \
            m.version AS version FROM movies m WHERE 1 = 1",
        );

        match title_search(search_title) {
            TitleSearch::Any => {}
            // search consisting only of separators
            TitleSearch::Nothing => {
                query.push(" AND 0");
            }
            TitleSearch::Match(expr) => {
                query
                    .push(" AND m.id IN (SELECT rowid FROM movies_fts WHERE movies_fts MATCH ")
                    .push_bind(expr)
                    .push(")");
            }
        }

        query
            .push(" AND NOT EXISTS (SELECT 1 FROM json_each(")
            .push_bind(Json(genres.to_vec()))
            .push(") AS wanted WHERE wanted.value NOT IN (SELECT value FROM json_each(m.genres)))")
            .push(" ORDER BY ")
            .push(sort.order_clause())
            .push(", m.id ASC LIMIT ")
            .push_bind(filters.limit())
            .push(" OFFSET ")
            .push_bind(filters.offset());

        let rows = self
            .bounded(query.build().fetch_all(&self.executor))
            .await?;

        let mut total_records = 0;
        let mut movies = Vec::with_capacity(rows.len());
        for row in rows {
            total_records = row.try_get("total_records")?;
            movies.push(Movie::from_row(&row)?);
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        debug!(
            total_records,
            returned = movies.len(),
            sort = %sort,
            "Listed movies"
        );
        Ok((movies, metadata))
    }

    /// Stores new field values if `movie.version` is still the current one.
    /// A deleted row and a concurrent edit both surface as `EditConflict`.
    pub async fn update(&self, movie: &mut Movie) -> Result<()> {
        movie.validate()?;
        let new_version: Option<i32> = self
            .bounded(
                sqlx::query_scalar(
                    "UPDATE movies SET title = ?, year = ?, runtime = ?, genres = ?, version = version + 1
                    WHERE id = ? AND version = ?
                    RETURNING version",
                )
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(Json(&movie.genres))
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.executor),
            )
            .await?;

        match new_version {
            Some(version) => {
                movie.version = version;
                Ok(())
            }
            None => {
                debug!(id = movie.id, version = movie.version, "Movie update conflict");
                Err(Error::EditConflict {
                    id: movie.id,
                    version: movie.version,
                })
            }
        }
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if id < 1 {
            return Err(Error::RecordNotFound(format!("Movie {id}")));
        }

        let res = self
            .bounded(
                sqlx::query("DELETE FROM movies WHERE id = ?")
                    .bind(id)
                    .execute(&self.executor),
            )
            .await?;

        if res.rows_affected() == 0 {
            Err(Error::RecordNotFound(format!("Movie {id}")))
        } else {
            Ok(())
        }
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = self
            .bounded(sqlx::query_scalar("SELECT count(*) FROM movies").fetch_one(&self.executor))
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genres(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn error_fields(movie: &Movie) -> Vec<(String, String)> {
        match movie.validate() {
            Ok(()) => vec![],
            Err(report) => report
                .iter()
                .map(|(path, error)| (path.to_string(), error.message().to_string()))
                .collect(),
        }
    }

    fn has_error(errors: &[(String, String)], field: &str, message: &str) -> bool {
        errors
            .iter()
            .any(|(f, m)| f == field && m.contains(message))
    }

    #[test]
    fn test_valid_movie() {
        let movie = Movie::new("Dune", 2021, 155, genres(&["scifi", "drama"]));
        assert!(movie.validate().is_ok());
    }

    #[test]
    fn test_genres_rules() {
        let movie = Movie::new("Dune", 2021, 155, vec![]);
        assert!(has_error(&error_fields(&movie), "genres", "at least 1 genre"));

        let movie = Movie::new("Dune", 2021, 155, genres(&["a", "b", "c", "d", "e", "f"]));
        assert!(has_error(&error_fields(&movie), "genres", "more than 5"));

        let movie = Movie::new("Dune", 2021, 155, genres(&["scifi", "drama", "scifi"]));
        assert!(has_error(&error_fields(&movie), "genres", "duplicate"));

        // comparison is case sensitive
        let movie = Movie::new("Dune", 2021, 155, genres(&["scifi", "SciFi"]));
        assert!(movie.validate().is_ok());

        let movie = Movie::new("Dune", 2021, 155, genres(&["scifi", ""]));
        assert_eq!(
            error_fields(&movie),
            vec![("genres".to_string(), "must not contain empty values".to_string())]
        );

        let movie = Movie::new("Dune", 2021, 155, vec!["x".repeat(256)]);
        assert!(has_error(&error_fields(&movie), "genres", "longer than 255 bytes"));
    }

    #[test]
    fn test_year_rules() {
        let next_year = OffsetDateTime::now_utc().year() + 1;
        let movie = Movie::new("Dune", next_year, 155, genres(&["scifi"]));
        assert!(has_error(&error_fields(&movie), "year", "future"));

        let movie = Movie::new("Dune", 1887, 155, genres(&["scifi"]));
        assert!(has_error(&error_fields(&movie), "year", "greater than 1888"));

        let movie = Movie::new("Dune", 0, 155, genres(&["scifi"]));
        assert!(has_error(&error_fields(&movie), "year", "must be provided"));

        let movie = Movie::new("Roundhay Garden Scene", 1888, 1, genres(&["short"]));
        assert!(movie.validate().is_ok());
    }

    #[test]
    fn test_errors_accumulate() {
        let movie = Movie::new("x".repeat(501), 1800, -5, vec![]);
        let errors = error_fields(&movie);
        assert!(has_error(&errors, "title", "500 bytes"));
        assert!(has_error(&errors, "year", "1888"));
        assert!(has_error(&errors, "runtime", "positive integer"));
        assert!(has_error(&errors, "genres", "at least 1 genre"));

        let movie = Movie::new("", 2000, 0, genres(&["drama"]));
        let errors = error_fields(&movie);
        assert!(has_error(&errors, "title", "must be provided"));
        assert!(has_error(&errors, "runtime", "must be provided"));
    }

    #[test]
    fn test_runtime_json() {
        assert_eq!(
            serde_json::to_string(&Runtime(155)).unwrap(),
            r#""155 mins""#
        );

        let runtime: Runtime = serde_json::from_str(r#""102 mins""#).unwrap();
        assert_eq!(runtime, Runtime(102));
        let runtime: Runtime = serde_json::from_str(r#""102""#).unwrap();
        assert_eq!(runtime, Runtime(102));
        let runtime: Runtime = serde_json::from_str("102").unwrap();
        assert_eq!(runtime, Runtime(102));

        let err = serde_json::from_str::<Runtime>(r#""102 minutes""#).unwrap_err();
        assert!(err.to_string().contains("invalid runtime format"));
        assert!(serde_json::from_str::<Runtime>("1.5").is_err());
    }

    #[test]
    fn test_movie_json_shape() {
        let mut movie = Movie::new("Casablanca", 1942, 102, genres(&["drama", "romance"]));
        movie.id = 7;
        movie.version = 1;
        let json = serde_json::to_value(&movie).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "title": "Casablanca",
                "year": 1942,
                "runtime": "102 mins",
                "genres": ["drama", "romance"],
                "version": 1
            })
        );
    }

    #[test]
    fn test_title_search_terms() {
        assert!(matches!(title_search(""), TitleSearch::Any));
        assert!(matches!(title_search("   "), TitleSearch::Nothing));
        assert!(matches!(title_search("!!"), TitleSearch::Nothing));
        match title_search("Black  panther") {
            TitleSearch::Match(expr) => assert_eq!(expr, r#""Black" "panther""#),
            _ => panic!("expected match expression"),
        }
        match title_search("\"dune\" OR NOT x") {
            TitleSearch::Match(expr) => assert_eq!(expr, r#""dune" "OR" "NOT" "x""#),
            _ => panic!("expected match expression"),
        }
    }
}
