use crate::identity::{PermissionStore, Permissions};

use super::{SharedStore, StoreError};

pub const PERMISSION_CODES: &[&str] = &["movies:read", "movies:write"];

impl SharedStore {
    /// Grants the listed codes; codes missing from the catalog are ignored.
    pub fn add_permissions_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut guard = self.0.lock();
        if !guard.users.contains_key(&user_id) { return Err(StoreError::RecordNotFound); }
        let known: Vec<String> = codes.iter().filter(|c| guard.permission_catalog.contains(**c)).map(|c| c.to_string()).collect();
        guard.user_permissions.entry(user_id).or_default().extend(known);
        Ok(())
    }

    pub fn permissions_for_user(&self, user_id: i64) -> Permissions {
        let guard = self.0.lock();
        guard.user_permissions.get(&user_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }
}

impl PermissionStore for SharedStore {
    fn permissions_of(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(self.permissions_for_user(user_id))
    }
}
