use chrono::{DateTime, Utc};

use super::principal::{Permissions, UserIdentity};
use super::token::{Fingerprint, TokenScope};
use crate::storage::StoreError;

/// Resolves token fingerprints to accounts. Implementations must enforce the scope
/// and `expiry > now` themselves; `StoreError::RecordNotFound` covers both unknown
/// and expired tokens.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, scope: TokenScope, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<UserIdentity, StoreError>;
}

pub trait PermissionStore: Send + Sync {
    fn permissions_of(&self, user_id: i64) -> Result<Permissions, StoreError>;
}
