use warp::reject::Reject;

use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("an account with that email or username already exists")]
    AccountAlreadyExists,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("email or password incorrect")]
    InvalidCredentials,
    #[error("error reaching the account store")]
    LookupFailure {
        #[from]
        source: StoreError,
    },
    #[error("error signing session token")]
    SigningError {
        source: Option<jsonwebtoken::errors::Error>,
    },
    #[error("error hashing password")]
    HashingError {
        #[from]
        source: argon2::Error,
    },
    #[error("error with token")]
    TokenError {
        #[from]
        source: Option<jsonwebtoken::errors::Error>,
    },
    #[error("session token has expired")]
    TokenExpired,
    #[error("login attempt timed out")]
    Timeout,
    #[error("password worker task failed")]
    TaskFailed,
}

impl Reject for AuthError {}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
