use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A resolved account behind a bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub activated: bool,
}

/// Exactly one principal is attached to every request that passes the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(UserIdentity),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool { matches!(self, Principal::Anonymous) }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(u.id),
        }
    }

    /// Anonymous is never activated.
    pub fn is_activated(&self) -> bool {
        match self {
            Principal::Anonymous => false,
            Principal::User(u) => u.activated,
        }
    }
}

/// Capability codes granted to a user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool { self.0.contains(code) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &str> { self.0.iter().map(String::as_str) }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Permissions(iter.into_iter().map(Into::into).collect())
    }
}
