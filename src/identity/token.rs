//! Opaque bearer tokens. The plaintext is 16 random bytes as unpadded base-32
//! (26 characters) and is handed to the client exactly once; only its SHA-256
//! fingerprint is ever stored or compared.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tprintln;
use crate::validator::Validator;

pub const TOKEN_PLAINTEXT_LEN: usize = 26;
const TOKEN_RANDOM_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(plaintext: &str) -> Self {
        let digest = Sha256::digest(plaintext.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Fingerprint(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn to_hex(&self) -> String { hex::encode(self.0) }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // short prefix is enough to correlate log lines
        write!(f, "Fingerprint({}..)", &self.to_hex()[..12])
    }
}

/// Freshly issued token. Serializes as `{"token": ..., "expiry": ...}` for the one
/// response that reveals the plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub fingerprint: Fingerprint,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: TokenScope,
}

pub fn generate_token(user_id: i64, ttl: Duration, scope: TokenScope) -> Result<Token> {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| anyhow!("token entropy unavailable: {}", e))?;
    let plaintext = BASE32_NOPAD.encode(&bytes);
    let fingerprint = Fingerprint::of(&plaintext);
    tprintln!("token.issue user={} scope={} fp={:?}", user_id, scope.as_str(), fingerprint);
    Ok(Token { plaintext, fingerprint, user_id, expiry: Utc::now() + ttl, scope })
}

/// Shape check done before any hashing or lookup.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_PLAINTEXT_LEN, "token", "must be 26 bytes long");
}
