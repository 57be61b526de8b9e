use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use password_hash::{PasswordHash, SaltString};
use serde::Serialize;

use crate::identity::{CredentialStore, Fingerprint, TokenScope, UserIdentity};
use crate::validator::{matches, Validator, EMAIL_RX};

use super::{SharedStore, StoreError};

/// Upper bound on password input; Argon2 is never run on anything longer.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Password held as an Argon2 PHC string. The plaintext is only kept between
/// `set` and validation of a freshly submitted value.
#[derive(Clone, Default)]
pub struct Password {
    plaintext: Option<String>,
    hash: Option<String>,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}

impl Password {
    pub fn set(&mut self, plaintext: &str) -> Result<()> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(anyhow!("password exceeds {} bytes", MAX_PASSWORD_BYTES));
        }
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let phc = Argon2::default().hash_password(plaintext.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
        self.plaintext = Some(plaintext.to_string());
        self.hash = Some(phc);
        Ok(())
    }

    /// Ok(false) on mismatch; Err only when the stored hash is unusable.
    pub fn matches(&self, plaintext: &str) -> Result<bool> {
        let Some(phc) = self.hash.as_deref() else { return Err(anyhow!("missing password hash")); };
        let parsed = PasswordHash::new(phc).map_err(|e| anyhow!(e.to_string()))?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!(e.to_string())),
        }
    }

    fn forget_plaintext(&mut self) { self.plaintext = None; }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn new(name: &str, email: &str) -> Self {
        Self { id: 0, created_at: Utc::now(), name: name.to_string(), email: email.to_string(), password: Password::default(), activated: false, version: 0 }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity { id: self.id, name: self.name.clone(), email: self.email.clone(), activated: self.activated }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 6, "password", "must be at least 6 bytes long");
    v.check(password.len() <= MAX_PASSWORD_BYTES, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, user: &User) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(user.name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, &user.email);
    if let Some(plaintext) = user.password.plaintext.as_deref() {
        validate_password_plaintext(v, plaintext);
    }
}

impl SharedStore {
    /// Assigns id, created_at and version 1. Emails are unique (case-insensitive).
    pub fn insert_user(&self, user: &mut User) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        if guard.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        user.id = guard.next_user_id;
        guard.next_user_id += 1;
        user.created_at = Utc::now();
        user.version = 1;
        let mut stored = user.clone();
        stored.password.forget_plaintext();
        guard.users.insert(user.id, stored);
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> Result<User, StoreError> {
        self.0.lock().users.get(&id).cloned().ok_or(StoreError::RecordNotFound)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let guard = self.0.lock();
        guard.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned().ok_or(StoreError::RecordNotFound)
    }

    /// Optimistic update: succeeds only when `user.version` matches the stored
    /// version, then bumps it.
    pub fn update_user(&self, user: &mut User) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        if guard.users.values().any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        let Some(current) = guard.users.get_mut(&user.id) else { return Err(StoreError::EditConflict); };
        if current.version != user.version {
            return Err(StoreError::EditConflict);
        }
        user.version += 1;
        let mut stored = user.clone();
        stored.password.forget_plaintext();
        *current = stored;
        Ok(())
    }

    /// The user owning a live token of `scope` with this plaintext.
    pub fn get_user_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, StoreError> {
        self.user_for_fingerprint(scope, &Fingerprint::of(plaintext), Utc::now())
    }

    fn user_for_fingerprint(&self, scope: TokenScope, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<User, StoreError> {
        let guard = self.0.lock();
        let record = guard.tokens.get(fingerprint).filter(|t| t.scope == scope && t.expiry > now).ok_or(StoreError::RecordNotFound)?;
        guard.users.get(&record.user_id).cloned().ok_or(StoreError::RecordNotFound)
    }
}

impl CredentialStore for SharedStore {
    fn resolve(&self, scope: TokenScope, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<UserIdentity, StoreError> {
        self.user_for_fingerprint(scope, fingerprint, now).map(|u| u.identity())
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod users_tests;
