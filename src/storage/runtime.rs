//! Movie runtime in minutes, carried in JSON as the string `"<n> mins"`.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const INVALID_RUNTIME_FORMAT: &str = "invalid runtime format";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} mins", self.0))
    }
}

struct RuntimeVisitor;

impl<'de> Visitor<'de> for RuntimeVisitor {
    type Value = Runtime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string of the form \"<n> mins\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Runtime, E> {
        let parts: Vec<&str> = value.split(' ').collect();
        if parts.len() != 2 || parts[1] != "mins" {
            return Err(E::custom(INVALID_RUNTIME_FORMAT));
        }
        parts[0].parse::<i32>().map(Runtime).map_err(|_| E::custom(INVALID_RUNTIME_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Runtime, D::Error> {
        deserializer.deserialize_str(RuntimeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_unit() {
        assert_eq!(serde_json::to_string(&Runtime(102)).unwrap(), "\"102 mins\"");
    }

    #[test]
    fn parses_valid_and_rejects_malformed() {
        assert_eq!(serde_json::from_str::<Runtime>("\"107 mins\"").unwrap(), Runtime(107));
        for bad in ["\"107\"", "\"107 minutes\"", "\"abc mins\"", "107", "\"1 2 mins\""] {
            let err = serde_json::from_str::<Runtime>(bad).unwrap_err();
            assert!(err.to_string().contains("invalid runtime format") || err.is_data(), "{}", bad);
        }
    }
}
