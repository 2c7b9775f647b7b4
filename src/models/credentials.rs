//! Credential and token models.
//!
//! [`Credentials`] are the long-lived account keys loaded once at startup.
//! [`Token`] is the short-lived bearer token derived from them. Both keep
//! their secret material in [`SecretString`] so it never shows up in `Debug`
//! output or logs.

use crate::error::ConfigError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default token lifetime requested from the platform, in seconds.
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 3600;

/// Domain suffix of Lacework tenant hostnames.
const LACEWORK_DOMAIN: &str = ".lacework.net";

/// Long-lived Lacework API credentials. Immutable for the process lifetime.
pub struct Credentials {
    account: String,
    key_id: String,
    secret: SecretString,
    subaccount: Option<String>,
    expiry: Duration,
}

impl Credentials {
    /// Build credentials, rejecting blank required values.
    ///
    /// `account` may be given either as the bare tenant name (`partner-demo`)
    /// or as its hostname (`partner-demo.lacework.net`).
    pub fn new(
        account: &str,
        key_id: &str,
        secret: &str,
        subaccount: Option<&str>,
        expiry_secs: u64,
    ) -> Result<Self, ConfigError> {
        let account = normalize_account(account);
        if account.is_empty() {
            return Err(ConfigError::Missing {
                name: "account",
                env: "LW_ACCOUNT",
                flag: "account",
            });
        }
        let key_id = key_id.trim();
        if key_id.is_empty() {
            return Err(ConfigError::Missing {
                name: "key id",
                env: "LW_KEY_ID",
                flag: "key-id",
            });
        }
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::Missing {
                name: "secret",
                env: "LW_SECRET",
                flag: "secret",
            });
        }
        if expiry_secs == 0 {
            return Err(ConfigError::invalid(
                "expiry",
                "token expiry must be greater than 0 seconds",
            ));
        }

        Ok(Self {
            account,
            key_id: key_id.to_string(),
            secret: SecretString::from(secret.to_string()),
            subaccount: subaccount
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            expiry: Duration::from_secs(expiry_secs),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn subaccount(&self) -> Option<&str> {
        self.subaccount.as_deref()
    }

    /// Configured upper bound on token lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// API root for this tenant.
    pub fn default_base_url(&self) -> String {
        format!("https://{}{}/api/v2", self.account, LACEWORK_DOMAIN)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .field("subaccount", &self.subaccount)
            .field("expiry_secs", &self.expiry.as_secs())
            .finish()
    }
}

fn normalize_account(account: &str) -> String {
    let account = account.trim();
    let account = account
        .strip_prefix("https://")
        .or_else(|| account.strip_prefix("http://"))
        .unwrap_or(account);
    let account = account.trim_end_matches('/');
    account
        .strip_suffix(LACEWORK_DOMAIN)
        .unwrap_or(account)
        .to_string()
}

/// A short-lived bearer token. Replaced, never mutated, on refresh.
pub struct Token {
    value: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a token issued at `issued_at` that lives for `ttl`.
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::zero());
        Self {
            value: SecretString::from(value.into()),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Raw bearer value. Only the API client should call this.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while `now` is before `expires_at - safety_margin`.
    pub fn is_usable_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        let margin = ChronoDuration::from_std(safety_margin).unwrap_or(ChronoDuration::zero());
        now < self.expires_at - margin
    }

}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
