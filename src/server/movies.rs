use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::helpers::{read_csv, read_id_param, read_int, read_json, read_string};
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::CurrentPrincipal;
use crate::storage::{validate_filters, validate_movie, Filters, Movie, Runtime, MOVIE_SORT_SAFELIST};
use crate::validator::Validator;

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieInput {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

pub async fn list_movies(State(state): State<AppState>, Query(qs): Query<HashMap<String, String>>) -> AppResult<Json<serde_json::Value>> {
    let mut v = Validator::new();
    let title = read_string(&qs, "title", "");
    let genres = read_csv(&qs, "genres", Vec::new());
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };
    validate_filters(&mut v, &filters);
    v.into_result()?;

    let (movies, metadata) = state.store.get_all_movies(&title, &genres, &filters)?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub async fn create_movie(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal, body: Body) -> AppResult<Response> {
    let input: CreateMovieInput = read_json(body).await?;
    let mut movie = Movie { title: input.title, year: input.year, runtime: input.runtime, genres: input.genres, ..Movie::default() };

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.into_result()?;

    state.store.insert_movie(&mut movie)?;
    tracing::info!(movie_id = movie.id, user_id = ?principal.user_id(), "movie created");
    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)).map_err(AppError::server_error)?;
    let mut response = (StatusCode::CREATED, Json(json!({ "movie": movie }))).into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

pub async fn show_movie(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let movie = state.store.get_movie(read_id_param(&id)?)?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn update_movie(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap, body: Body) -> AppResult<Json<serde_json::Value>> {
    let mut movie = state.store.get_movie(read_id_param(&id)?)?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(AppError::edit_conflict());
        }
    }

    let input: UpdateMovieInput = read_json(body).await?;
    if let Some(title) = input.title { movie.title = title; }
    if let Some(year) = input.year { movie.year = year; }
    if let Some(runtime) = input.runtime { movie.runtime = runtime; }
    if let Some(genres) = input.genres { movie.genres = genres; }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.into_result()?;

    state.store.update_movie(&mut movie)?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    state.store.delete_movie(read_id_param(&id)?)?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}
