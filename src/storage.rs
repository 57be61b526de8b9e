//!
//! marquee storage module
//! -----------------------
//! In-memory reference implementation of every storage collaborator the API
//! consumes: users, tokens, permissions and the movie catalog. Persistence is out
//! of scope; the shapes here mirror what a SQL-backed store would offer
//! (optimistic versioning, unique emails, fingerprint-keyed tokens).
//!
//! The public API centers around the `Store` type, wrapped in a thread-safe
//! `SharedStore` (`Arc<Mutex<Store>>`) that implements the credential and
//! permission lookup traits used by the request pipeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::Fingerprint;

pub mod filters;
pub mod movies;
pub mod permissions;
pub mod runtime;
pub mod tokens;
pub mod users;

pub use filters::{Filters, Metadata, validate_filters};
pub use movies::{Movie, MOVIE_SORT_SAFELIST, validate_movie};
pub use permissions::PERMISSION_CODES;
pub use runtime::Runtime;
pub use tokens::TokenRecord;
pub use users::{User, Password, validate_email, validate_password_plaintext, validate_user};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// All tables of the in-memory store.
#[derive(Debug)]
pub struct Store {
    users: BTreeMap<i64, User>,
    next_user_id: i64,
    tokens: HashMap<Fingerprint, TokenRecord>,
    permission_catalog: BTreeSet<String>,
    user_permissions: HashMap<i64, BTreeSet<String>>,
    movies: BTreeMap<i64, Movie>,
    next_movie_id: i64,
    /// Catalog listings served, for observing which requests reach storage.
    movie_list_queries: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            next_user_id: 1,
            tokens: HashMap::new(),
            permission_catalog: PERMISSION_CODES.iter().map(|c| c.to_string()).collect(),
            user_permissions: HashMap::new(),
            movies: BTreeMap::new(),
            next_movie_id: 1,
            movie_list_queries: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new() -> Self { Self::default() }

    pub fn movie_list_queries(&self) -> u64 { self.0.lock().movie_list_queries }
}
