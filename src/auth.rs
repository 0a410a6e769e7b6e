use std::sync::{Arc, OnceLock};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, warn};

use crate::{
    config::AuthConfig,
    error::AuthError,
    types::{unix_now, Account, Claims, Email, HashedPassword, SessionToken, Username},
};

pub(crate) struct AuthInternal {
    config: AuthConfig,
    // verified against when an email has no account, so both paths cost one hash
    dummy_hash: OnceLock<Option<HashedPassword>>,
}

/// Credential verification and session issuance. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct Auth {
    pub(crate) internal: Arc<AuthInternal>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            internal: Arc::new(AuthInternal {
                config,
                dummy_hash: OnceLock::new(),
            }),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.internal.config
    }

    /// Create a new unverified account with a freshly salted hash of `password`.
    pub async fn register(
        &self,
        username: &Username,
        email: &Email,
        location: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if username.0.is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty"));
        }
        if email.0.is_empty() {
            return Err(AuthError::InvalidInput("email must not be empty"));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty"));
        }

        let account = Account {
            username: username.clone(),
            email: email.clone(),
            location: location.to_owned(),
            verified: false,
            password_hash: self.hash_password(password).await?,
        };

        let created = self
            .config()
            .account_store
            .create_account_if_not_exists(&account)
            .await
            .map_err(|source| {
                warn!(error = %source, "account store insert failed");
                AuthError::LookupFailure { source }
            })?;

        if !created {
            return Err(AuthError::AccountAlreadyExists);
        }

        info!(email = %email.0, username = %username.0, "account created");
        Ok(())
    }

    /// Verify `password` against the hash stored for `email`, issuing a session token on success.
    ///
    /// An unknown email and a wrong password both produce [`AuthError::InvalidCredentials`].
    pub async fn login(&self, email: &Email, password: &str) -> Result<SessionToken, AuthError> {
        let attempt = async {
            if !self.verify_credentials(email, password).await? {
                debug!(email = %email.0, "login rejected");
                return Err(AuthError::InvalidCredentials);
            }

            let session = self.issue_session_token(email)?;
            info!(email = %email.0, exp = session.claims.exp, "session issued");
            Ok::<_, AuthError>(session)
        };

        match self.config().login_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                warn!(email = %email.0, ?limit, "login attempt timed out");
                AuthError::Timeout
            })?,
            None => attempt.await,
        }
    }

    /// Check `password` against the stored hash for `email`.
    ///
    /// Returns `Ok(false)` for a missing account, a mismatch, empty input, or a stored hash
    /// that cannot be parsed. Only a failure to reach the store is an error.
    pub async fn verify_credentials(&self, email: &Email, password: &str) -> Result<bool, AuthError> {
        if email.0.is_empty() || password.is_empty() {
            return Ok(false);
        }

        let stored = self
            .config()
            .account_store
            .get_password_hash(email)
            .await
            .map_err(|source| {
                warn!(error = %source, "account store lookup failed");
                AuthError::LookupFailure { source }
            })?;

        let auth = self.clone();
        let password = password.to_owned();
        run_blocking(move || match stored {
            Some(hash) => verify_hash(&hash, &password),
            None => {
                if let Some(dummy) = auth.dummy_hash() {
                    verify_hash(dummy, &password);
                }
                false
            }
        })
        .await
    }

    /// Build and sign a session token for `email`.
    ///
    /// Callers must only do this after [`Auth::verify_credentials`] returned `true` for the
    /// same email.
    pub fn issue_session_token(&self, email: &Email) -> Result<SessionToken, AuthError> {
        let config = self.config();
        if config.auth_token_secret.is_empty() {
            warn!("refusing to issue a session token without a signing secret");
            return Err(AuthError::SigningError { source: None });
        }

        let iat = unix_now();
        let exp = iat
            .checked_add(config.session_lifetime.as_secs())
            .ok_or_else(|| {
                warn!(lifetime = ?config.session_lifetime, "session lifetime overflows the expiry claim");
                AuthError::SigningError { source: None }
            })?;

        let claims = Claims {
            sub: email.0.clone(),
            iat,
            exp,
            iss: config.auth_token_issuer.clone(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.auth_token_secret.as_bytes()),
        )
        .map_err(|source| {
            warn!(error = %source, "failed to sign session token");
            AuthError::SigningError {
                source: Some(source),
            }
        })?;

        Ok(SessionToken { token, claims })
    }

    /// Decode a session token, checking its signature, issuer and expiry.
    pub fn verify_session_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_session_token_at(token, unix_now())
    }

    pub(crate) fn verify_session_token_at(&self, token: &str, now: u64) -> Result<Claims, AuthError> {
        let config = self.config();
        if config.auth_token_secret.is_empty() {
            return Err(AuthError::TokenError { source: None });
        }

        // expiry is checked below with an inclusive boundary and no leeway
        let mut validation = Validation::default();
        validation.set_issuer(&[&config.auth_token_issuer]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let token = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.auth_token_secret.as_bytes()),
            &validation,
        )
        .map_err(|source| AuthError::TokenError {
            source: Some(source),
        })?;

        if token.claims.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }

        Ok(token.claims)
    }

    pub(crate) async fn hash_password(&self, password: &str) -> Result<HashedPassword, AuthError> {
        let password = password.to_owned();
        let (mem_cost, time_cost) = (self.config().hash_mem_cost_kib, self.config().hash_time_cost);

        let encoded = run_blocking(move || hash_with_costs(&password, mem_cost, time_cost)).await??;
        Ok(HashedPassword(encoded))
    }

    fn dummy_hash(&self) -> Option<&HashedPassword> {
        let config = self.config();
        self.internal
            .dummy_hash
            .get_or_init(|| {
                hash_with_costs("", config.hash_mem_cost_kib, config.hash_time_cost)
                    .or_else(|err| {
                        warn!(
                            error = %err,
                            mem_cost = config.hash_mem_cost_kib,
                            time_cost = config.hash_time_cost,
                            "configured argon2 costs are unusable, falling back to defaults for unknown emails"
                        );
                        let defaults = argon2::Config::default();
                        hash_with_costs("", defaults.mem_cost, defaults.time_cost)
                    })
                    .map_err(|err| warn!(error = %err, "could not build the unknown-email hash"))
                    .map(HashedPassword)
                    .ok()
            })
            .as_ref()
    }
}

pub(crate) fn hash_with_costs(
    password: &str,
    mem_cost: u32,
    time_cost: u32,
) -> Result<String, argon2::Error> {
    let salt: [u8; 16] = rand::random();
    let config = argon2::Config {
        mem_cost,
        time_cost,
        ..argon2::Config::default()
    };

    argon2::hash_encoded(password.as_bytes(), &salt, &config)
}

fn verify_hash(hash: &HashedPassword, password: &str) -> bool {
    match argon2::verify_encoded(&hash.0, password.as_bytes()) {
        Ok(matches) => matches,
        Err(err) => {
            warn!(error = %err, "stored password hash could not be parsed");
            false
        }
    }
}

// Password hashing is slow on purpose, keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        warn!(error = %err, "password worker task failed");
        AuthError::TaskFailed
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryAccountStore;

    fn test_auth(secret: &str) -> Auth {
        let mut config = AuthConfig::new(secret, Arc::new(MemoryAccountStore::new()));
        config.hash_mem_cost_kib = 256;
        config.hash_time_cost = 1;
        Auth::new(config)
    }

    #[test]
    fn token_expires_one_lifetime_after_issue() {
        let auth = test_auth("this is a test secret");
        let session = auth
            .issue_session_token(&Email("alice@example.com".into()))
            .unwrap();

        assert!(!session.token.is_empty());
        assert_eq!(session.claims.sub, "alice@example.com");
        assert_eq!(session.claims.iss, "coldfinance");
        assert_eq!(session.claims.exp, session.claims.iat + 3600);
        assert_eq!(session.claims.lifetime_secs(), 3600);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let auth = test_auth("this is a test secret");
        let session = auth
            .issue_session_token(&Email("alice@example.com".into()))
            .unwrap();
        let exp = session.claims.exp;

        let claims = auth.verify_session_token_at(&session.token, exp - 1).unwrap();
        assert_eq!(claims, session.claims);

        assert!(matches!(
            auth.verify_session_token_at(&session.token, exp),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            auth.verify_session_token_at(&session.token, exp + 60),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn session_lifetime_is_configurable() {
        let mut config = AuthConfig::new("secret", Arc::new(MemoryAccountStore::new()));
        config.session_lifetime = Duration::from_secs(90);
        let auth = Auth::new(config);

        let session = auth.issue_session_token(&Email("a@b.c".into())).unwrap();
        assert_eq!(session.claims.lifetime_secs(), 90);
    }

    #[test]
    fn overflowing_lifetime_is_a_signing_error() {
        let mut config = AuthConfig::new("secret", Arc::new(MemoryAccountStore::new()));
        config.session_lifetime = Duration::from_secs(u64::MAX);
        let auth = Auth::new(config);

        assert!(matches!(
            auth.issue_session_token(&Email("alice@example.com".into())),
            Err(AuthError::SigningError { source: None })
        ));
    }

    #[tokio::test]
    async fn unknown_email_still_runs_a_verification() {
        let auth = test_auth("secret");
        assert!(auth.internal.dummy_hash.get().is_none());

        let found = auth
            .verify_credentials(&Email("bob@nowhere.com".into()), "anything")
            .await
            .unwrap();

        assert!(!found);
        assert!(matches!(auth.internal.dummy_hash.get(), Some(Some(_))));
    }

    #[tokio::test]
    async fn unusable_costs_still_hash_for_unknown_emails() {
        let mut config = AuthConfig::new("secret", Arc::new(MemoryAccountStore::new()));
        config.hash_mem_cost_kib = 0;
        let auth = Auth::new(config);

        let found = auth
            .verify_credentials(&Email("bob@nowhere.com".into()), "anything")
            .await
            .unwrap();

        assert!(!found);
        assert!(matches!(auth.internal.dummy_hash.get(), Some(Some(_))));
    }

    #[test]
    fn missing_secret_is_a_signing_error() {
        let auth = test_auth("");

        assert!(matches!(
            auth.issue_session_token(&Email("alice@example.com".into())),
            Err(AuthError::SigningError { .. })
        ));
    }

    #[test]
    fn tokens_from_other_secrets_or_issuers_are_rejected() {
        let session = test_auth("secret one")
            .issue_session_token(&Email("alice@example.com".into()))
            .unwrap();

        assert!(matches!(
            test_auth("secret two").verify_session_token(&session.token),
            Err(AuthError::TokenError { .. })
        ));

        let mut config = AuthConfig::new("secret one", Arc::new(MemoryAccountStore::new()));
        config.auth_token_issuer = "someone else".into();
        assert!(matches!(
            Auth::new(config).verify_session_token(&session.token),
            Err(AuthError::TokenError { .. })
        ));

        assert!(matches!(
            test_auth("secret one").verify_session_token("not.a.token"),
            Err(AuthError::TokenError { .. })
        ));
    }

    #[tokio::test]
    async fn hash_verification_is_deterministic() {
        let auth = test_auth("secret");
        let hash = auth.hash_password("correct-horse").await.unwrap();

        assert_ne!(hash.0, "correct-horse");
        for _ in 0..3 {
            assert!(verify_hash(&hash, "correct-horse"));
            assert!(!verify_hash(&hash, "wrong"));
        }
    }

    #[tokio::test]
    async fn same_password_gets_a_fresh_salt() {
        let auth = test_auth("secret");
        let first = auth.hash_password("correct-horse").await.unwrap();
        let second = auth.hash_password("correct-horse").await.unwrap();

        assert_ne!(first.0, second.0);
        assert!(verify_hash(&second, "correct-horse"));
    }

    #[test]
    fn malformed_stored_hash_never_matches() {
        assert!(!verify_hash(&HashedPassword("plaintext".into()), "plaintext"));
    }
}
