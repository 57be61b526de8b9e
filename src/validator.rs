//! Field-level validation accumulator. Checks record the first failure per field;
//! a non-empty error map becomes a 422 `AppError::Validation`.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("email regex compiles")
});

#[derive(Debug, Clone, Default)]
pub struct Validator {
    pub errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self { Self::default() }

    pub fn valid(&self) -> bool { self.errors.is_empty() }

    /// Adds an error unless the field already has one.
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors.entry(key.to_string()).or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok { self.add_error(key, message); }
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.valid() { Ok(()) } else { Err(AppError::failed_validation(self.errors)) }
    }
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.iter().any(|p| p == value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "page", "must be greater than zero");
        v.check(false, "page", "must be a maximum of 10 million");
        assert!(!v.valid());
        assert_eq!(v.errors.get("page").map(String::as_str), Some("must be greater than zero"));
    }

    #[test]
    fn into_result_builds_validation_error() {
        let mut v = Validator::new();
        assert!(v.clone().into_result().is_ok());
        v.add_error("email", "must be provided");
        match v.into_result() {
            Err(AppError::Validation { fields, .. }) => assert!(fields.contains_key("email")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn helpers() {
        assert!(permitted_value(&"id", &["id", "-id"]));
        assert!(!permitted_value(&"name", &["id", "-id"]));
        assert!(unique(&["a", "b"]));
        assert!(!unique(&["a", "a"]));
        assert!(matches("alice@example.com", &EMAIL_RX));
        assert!(!matches("alice@", &EMAIL_RX));
    }
}
