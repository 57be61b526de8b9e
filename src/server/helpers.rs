//! JSON body decoding, query-string readers and the fallback handlers.

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::http::Method;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::storage::runtime::INVALID_RUNTIME_FORMAT;
use crate::validator::Validator;

pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Decode a request body into `T`, turning serde failures into messages a client
/// can act on. Target types are expected to use `deny_unknown_fields`.
pub async fn read_json<T: DeserializeOwned>(body: Body) -> AppResult<T> {
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::bad_request(format!("body must not be larger than {} bytes", MAX_BODY_BYTES)))?;
    decode_json(&bytes)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("body must not be empty"));
    }
    serde_json::from_slice(bytes).map_err(|e| AppError::bad_request(describe_json_error(&e)))
}

fn describe_json_error(err: &serde_json::Error) -> String {
    use serde_json::error::Category;
    let msg = err.to_string();
    match err.classify() {
        Category::Syntax if msg.starts_with("trailing characters") => "body must only contain a single JSON value".to_string(),
        Category::Syntax => format!("body contains badly-formed JSON (at character {})", err.column()),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data if msg.starts_with("unknown field") => {
            let key = msg.split('`').nth(1).unwrap_or_default();
            format!("body contains unknown key \"{}\"", key)
        }
        Category::Data if msg.starts_with(INVALID_RUNTIME_FORMAT) => INVALID_RUNTIME_FORMAT.to_string(),
        Category::Data => format!("body contains incorrect JSON type (at character {})", err.column()),
        Category::Io => "body could not be read".to_string(),
    }
}

pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(s) if !s.is_empty() => s.clone(),
        _ => default.to_string(),
    }
}

pub fn read_csv(qs: &HashMap<String, String>, key: &str, default: Vec<String>) -> Vec<String> {
    match qs.get(key) {
        Some(s) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
        _ => default,
    }
}

/// Missing keys yield `default`; non-integers record a validation error.
pub fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        Some(s) if !s.is_empty() => match s.parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
        _ => default,
    }
}

/// Path ids are positive integers; anything else is simply not found.
pub fn read_id_param(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::not_found()),
    }
}

pub async fn not_found() -> AppError {
    AppError::not_found()
}

pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::method_not_allowed(method.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Input {
        #[allow(dead_code)]
        name: String,
    }

    fn bad(body: &str) -> String {
        match decode_json::<Input>(body.as_bytes()) {
            Err(e) => e.message().to_string(),
            Ok(v) => panic!("decoded {:?}", v),
        }
    }

    #[test]
    fn json_errors_are_client_friendly() {
        assert_eq!(bad(""), "body must not be empty");
        assert_eq!(bad("{\"name\": \"a\"} {}"), "body must only contain a single JSON value");
        assert_eq!(bad("{\"name\": \"a\", \"age\": 3}"), "body contains unknown key \"age\"");
        assert!(bad("{\"name\": 7}").starts_with("body contains incorrect JSON type"));
        assert!(bad("{\"name\" \"a\"}").starts_with("body contains badly-formed JSON"));
        assert_eq!(bad("{\"name\": "), "body contains badly-formed JSON");
    }

    #[test]
    fn query_readers() {
        let qs: HashMap<String, String> =
            [("genres", "drama,crime"), ("page", "x"), ("title", "")].into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut v = Validator::new();
        assert_eq!(read_csv(&qs, "genres", vec![]), vec!["drama".to_string(), "crime".to_string()]);
        assert_eq!(read_string(&qs, "title", "any"), "any");
        assert_eq!(read_int(&qs, "page", 1, &mut v), 1);
        assert_eq!(read_int(&qs, "page_size", 20, &mut v), 20);
        assert_eq!(v.errors.get("page").map(String::as_str), Some("must be an integer value"));
    }

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(read_id_param("12").unwrap(), 12);
        assert_eq!(read_id_param("0").unwrap_err(), AppError::not_found());
        assert_eq!(read_id_param("abc").unwrap_err(), AppError::not_found());
    }
}
