//! Authorization gates. Each gate runs the one beneath it first, so an anonymous
//! caller never reaches the activation check and an inactive caller never reaches
//! the permission lookup.

use super::principal::{Principal, UserIdentity};
use super::provider::PermissionStore;
use crate::error::{AppError, AppResult};

pub fn require_authenticated(principal: &Principal) -> AppResult<&UserIdentity> {
    match principal {
        Principal::Anonymous => Err(AppError::authentication_required()),
        Principal::User(user) => Ok(user),
    }
}

pub fn require_activated(principal: &Principal) -> AppResult<&UserIdentity> {
    let user = require_authenticated(principal)?;
    if !user.activated {
        return Err(AppError::inactive_account());
    }
    Ok(user)
}

pub fn require_permission(permissions: &dyn PermissionStore, principal: &Principal, code: &str) -> AppResult<()> {
    let user = require_activated(principal)?;
    let granted = permissions.permissions_of(user.id).map_err(AppError::server_error)?;
    if !granted.include(code) {
        tracing::debug!(target: "auth", user_id = user.id, code, "permission denied");
        return Err(AppError::not_permitted());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::identity::Permissions;
    use crate::storage::StoreError;

    struct FixedPermissions {
        codes: Vec<&'static str>,
        lookups: AtomicUsize,
    }

    impl FixedPermissions {
        fn new(codes: Vec<&'static str>) -> Self { Self { codes, lookups: AtomicUsize::new(0) } }
    }

    impl PermissionStore for FixedPermissions {
        fn permissions_of(&self, _user_id: i64) -> Result<Permissions, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.codes.iter().copied().collect())
        }
    }

    struct BrokenPermissions;

    impl PermissionStore for BrokenPermissions {
        fn permissions_of(&self, _user_id: i64) -> Result<Permissions, StoreError> {
            Err(StoreError::Unavailable("permissions table offline".into()))
        }
    }

    fn user(activated: bool) -> Principal {
        Principal::User(UserIdentity { id: 42, name: "Ada".into(), email: "ada@example.com".into(), activated })
    }

    #[test]
    fn anonymous_fails_as_unauthenticated_never_inactive() {
        assert_eq!(require_activated(&Principal::Anonymous).unwrap_err(), AppError::authentication_required());
        let perms = FixedPermissions::new(vec!["movies:read"]);
        assert_eq!(require_permission(&perms, &Principal::Anonymous, "movies:read").unwrap_err(), AppError::authentication_required());
        assert_eq!(perms.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inactive_user_is_rejected_before_permission_lookup() {
        let perms = FixedPermissions::new(vec!["movies:read", "movies:write"]);
        assert_eq!(require_permission(&perms, &user(false), "movies:read").unwrap_err(), AppError::inactive_account());
        assert_eq!(perms.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn permission_membership_decides() {
        let perms = FixedPermissions::new(vec!["movies:read"]);
        assert!(require_permission(&perms, &user(true), "movies:read").is_ok());
        assert_eq!(require_permission(&perms, &user(true), "movies:write").unwrap_err(), AppError::not_permitted());
    }

    #[test]
    fn lookup_failure_is_internal() {
        let err = require_permission(&BrokenPermissions, &user(true), "movies:read").unwrap_err();
        assert_eq!(err.http_status(), 500);
    }
}
