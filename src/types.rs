use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct Email(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct Username(pub String);

/// An encoded argon2 hash, salt and parameters included.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[repr(transparent)]
pub struct HashedPassword(pub String);

/// A stored user account. The email and the username are each unique within a store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub username: Username,
    pub email: Email,
    pub location: String,
    pub verified: bool,
    pub password_hash: HashedPassword,
}

/// Claims carried inside a session token. Timestamps are seconds since the unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
}

impl Claims {
    /// A token is expired from the `exp` second onwards.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.exp
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.exp.saturating_sub(self.iat)
    }
}

/// A signed session token together with the claims it was built from.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub claims: Claims,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
