//! Identity for the request pipeline: who is calling, how their bearer token is
//! issued and resolved, and which gates they must pass before a handler runs.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod provider;
mod request_context;
pub mod authorizer;

pub use principal::{Principal, UserIdentity, Permissions};
pub use token::{Token, TokenScope, Fingerprint, generate_token, validate_token_plaintext, TOKEN_PLAINTEXT_LEN};
pub use provider::{CredentialStore, PermissionStore};
pub use request_context::{RequestContext, CurrentPrincipal};
pub use authorizer::{require_authenticated, require_activated, require_permission};
