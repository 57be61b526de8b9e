use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::validator::{unique, Validator};

use super::{Filters, Metadata, Runtime, SharedStore, StoreError};

pub const MOVIE_SORT_SAFELIST: &[&str] = &["id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero_year")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero_runtime")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero_year(y: &i32) -> bool { *y == 0 }
fn is_zero_runtime(r: &Runtime) -> bool { r.0 == 0 }

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(movie.year <= Utc::now().year(), "year", "must not be in the future");

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(movie.genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

/// Every word of `query` appears as a word of `title`, case-insensitively.
/// An empty query matches everything.
fn title_matches(title: &str, query: &str) -> bool {
    let words: Vec<String> = title.split_whitespace().map(str::to_lowercase).collect();
    query.split_whitespace().all(|q| words.iter().any(|w| *w == q.to_lowercase()))
}

impl SharedStore {
    pub fn insert_movie(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        movie.id = guard.next_movie_id;
        guard.next_movie_id += 1;
        movie.created_at = Utc::now();
        movie.version = 1;
        guard.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    pub fn get_movie(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 { return Err(StoreError::RecordNotFound); }
        self.0.lock().movies.get(&id).cloned().ok_or(StoreError::RecordNotFound)
    }

    /// Writes back `movie` if its version is still current; a row that vanished in
    /// the meantime is reported as an edit conflict too.
    pub fn update_movie(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        let Some(current) = guard.movies.get_mut(&movie.id) else { return Err(StoreError::EditConflict); };
        if current.version != movie.version { return Err(StoreError::EditConflict); }
        movie.version += 1;
        *current = movie.clone();
        Ok(())
    }

    pub fn delete_movie(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 { return Err(StoreError::RecordNotFound); }
        self.0.lock().movies.remove(&id).map(|_| ()).ok_or(StoreError::RecordNotFound)
    }

    /// Filtered, sorted, paginated listing. Ties on the sort column fall back to
    /// ascending id so pages are stable.
    pub fn get_all_movies(&self, title: &str, genres: &[String], filters: &Filters) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let mut guard = self.0.lock();
        guard.movie_list_queries += 1;
        let mut rows: Vec<Movie> = guard
            .movies
            .values()
            .filter(|m| title_matches(&m.title, title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();
        drop(guard);

        let column = filters.sort_column();
        rows.sort_by(|a, b| {
            let ord = match column {
                "title" => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.cmp(&b.runtime),
                _ => a.id.cmp(&b.id),
            };
            let ord = if filters.descending() { ord.reverse() } else { ord };
            ord.then(a.id.cmp(&b.id))
        });

        let total = rows.len() as i64;
        let page: Vec<Movie> = rows.into_iter().skip(filters.offset()).take(filters.limit()).collect();
        Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
    }
}
