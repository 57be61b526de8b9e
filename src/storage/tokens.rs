use chrono::{DateTime, Duration, Utc};

use crate::identity::{generate_token, Fingerprint, Token, TokenScope};

use super::{SharedStore, StoreError};

/// What is persisted for an issued token. There is deliberately no plaintext field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub fingerprint: Fingerprint,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl SharedStore {
    /// Issue a token for `user_id` and persist its fingerprint. The returned token is
    /// the only copy of the plaintext.
    pub fn new_token(&self, user_id: i64, ttl: Duration, scope: TokenScope) -> anyhow::Result<Token> {
        let token = generate_token(user_id, ttl, scope)?;
        self.insert_token(&token)?;
        Ok(token)
    }

    pub fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        if !guard.users.contains_key(&token.user_id) { return Err(StoreError::RecordNotFound); }
        guard.tokens.insert(token.fingerprint, TokenRecord {
            fingerprint: token.fingerprint,
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    pub fn delete_all_tokens_for_user(&self, scope: TokenScope, user_id: i64) -> usize {
        let mut guard = self.0.lock();
        let before = guard.tokens.len();
        guard.tokens.retain(|_, t| !(t.scope == scope && t.user_id == user_id));
        before - guard.tokens.len()
    }

    pub fn token_records_for_user(&self, user_id: i64) -> Vec<TokenRecord> {
        self.0.lock().tokens.values().filter(|t| t.user_id == user_id).cloned().collect()
    }
}
