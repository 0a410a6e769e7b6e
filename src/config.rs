use std::{env, str::FromStr, sync::Arc, time::Duration};

use crate::{auth::hash_with_costs, error::ConfigError, store::AccountStore, types::unix_now};

pub const DEFAULT_TOKEN_ISSUER: &str = "coldfinance";
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(60 * 60);

const SECRET_VAR: &str = "COLDFINANCE_TOKEN_SECRET";
const ISSUER_VAR: &str = "COLDFINANCE_TOKEN_ISSUER";
const LIFETIME_VAR: &str = "COLDFINANCE_SESSION_LIFETIME_SECS";
const TIMEOUT_VAR: &str = "COLDFINANCE_LOGIN_TIMEOUT_SECS";
const MEM_COST_VAR: &str = "COLDFINANCE_HASH_MEM_COST_KIB";
const TIME_COST_VAR: &str = "COLDFINANCE_HASH_TIME_COST";

#[derive(Clone)]
pub struct AuthConfig {
    /// The issuer for auth tokens. We will validate that all auth tokens match the given issuer.
    pub auth_token_issuer: String,
    /// The secret used to sign JWT session tokens.
    /// If the secret changes, all currently authenticated sessions will be terminated.
    pub auth_token_secret: String,
    /// How long a session lasts. Both the token's `exp` claim and the session cookie use it.
    pub session_lifetime: Duration,
    /// Upper bound on a whole login attempt, lookup and hash verification included.
    pub login_timeout: Option<Duration>,
    /// Argon2 memory cost in KiB for newly hashed passwords.
    pub hash_mem_cost_kib: u32,
    /// Argon2 iteration count for newly hashed passwords.
    pub hash_time_cost: u32,
    pub account_store: Arc<dyn AccountStore>,
}

impl AuthConfig {
    pub fn new(auth_token_secret: impl Into<String>, account_store: Arc<dyn AccountStore>) -> Self {
        let hash_defaults = argon2::Config::default();

        Self {
            auth_token_issuer: DEFAULT_TOKEN_ISSUER.into(),
            auth_token_secret: auth_token_secret.into(),
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            login_timeout: None,
            hash_mem_cost_kib: hash_defaults.mem_cost,
            hash_time_cost: hash_defaults.time_cost,
            account_store,
        }
    }

    /// Build a config from `COLDFINANCE_*` environment variables.
    /// Only `COLDFINANCE_TOKEN_SECRET` is required.
    pub fn from_env(account_store: Arc<dyn AccountStore>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok(), account_store)
    }

    pub(crate) fn from_lookup<F>(
        lookup: F,
        account_store: Arc<dyn AccountStore>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(SECRET_VAR)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing(SECRET_VAR))?;

        let mut config = Self::new(secret, account_store);

        if let Some(issuer) = lookup(ISSUER_VAR) {
            config.auth_token_issuer = issuer;
        }
        // a lifetime must leave room for `exp = now + lifetime`
        if let Some(secs) = parse_var::<u64, _>(&lookup, LIFETIME_VAR)? {
            if secs == 0 || unix_now().checked_add(secs).is_none() {
                return Err(invalid(LIFETIME_VAR, secs));
            }
            config.session_lifetime = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, TIMEOUT_VAR)? {
            if secs == 0 {
                return Err(invalid(TIMEOUT_VAR, secs));
            }
            config.login_timeout = Some(Duration::from_secs(secs));
        }

        let mem_cost = parse_var(&lookup, MEM_COST_VAR)?;
        let time_cost = parse_var(&lookup, TIME_COST_VAR)?;
        if let Some(kib) = mem_cost {
            config.hash_mem_cost_kib = kib;
        }
        if let Some(iterations) = time_cost {
            config.hash_time_cost = iterations;
        }
        // argon2's own defaults need no check
        if mem_cost.is_some() || time_cost.is_some() {
            hash_with_costs("", config.hash_mem_cost_kib, config.hash_time_cost).map_err(|_| {
                let name = if mem_cost.is_some() { MEM_COST_VAR } else { TIME_COST_VAR };
                ConfigError::Invalid {
                    name,
                    value: format!(
                        "mem_cost={} time_cost={}",
                        config.hash_mem_cost_kib, config.hash_time_cost
                    ),
                }
            })?;
        }

        Ok(config)
    }
}

fn invalid(name: &'static str, value: u64) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
