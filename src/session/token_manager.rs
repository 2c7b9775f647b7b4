//! Bearer token lifecycle.
//!
//! # Concurrency
//!
//! - The current token and the in-flight refresh live behind a
//!   `std::sync::Mutex` that is never held across an await point.
//! - A refresh runs in its own spawned task and is shared with every waiter
//!   through [`Shared`], so N concurrent callers trigger one exchange.
//! - The spawned task publishes its result itself. Cancelling the tool call
//!   that started a refresh therefore does not cancel the refresh.

use crate::error::AuthError;
use crate::lacework::AuthExchange;
use crate::models::{Credentials, Token};
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Refresh this long before the announced expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<Token>, AuthError>>>;

#[derive(Default)]
struct TokenState {
    current: Option<Arc<Token>>,
    inflight: Option<RefreshFuture>,
}

/// Owns the bearer token and refreshes it on demand.
pub struct TokenManager {
    credentials: Arc<Credentials>,
    exchanger: Arc<dyn AuthExchange>,
    state: Arc<Mutex<TokenState>>,
    safety_margin: Duration,
    exchanges: Arc<AtomicU64>,
}

impl TokenManager {
    /// Create a token manager. No exchange happens until the first call.
    pub fn new(credentials: Arc<Credentials>, exchanger: Arc<dyn AuthExchange>) -> Self {
        Self::with_safety_margin(credentials, exchanger, DEFAULT_SAFETY_MARGIN)
    }

    pub fn with_safety_margin(
        credentials: Arc<Credentials>,
        exchanger: Arc<dyn AuthExchange>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            credentials,
            exchanger,
            state: Arc::new(Mutex::new(TokenState::default())),
            safety_margin,
            exchanges: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return a token that is valid for at least the safety margin,
    /// exchanging credentials first if needed.
    pub async fn get_valid_token(&self) -> Result<Arc<Token>, AuthError> {
        let refresh = {
            let mut state = self.lock_state();
            if let Some(token) = &state.current {
                if token.is_usable_at(Utc::now(), self.safety_margin) {
                    return Ok(token.clone());
                }
            }
            self.join_or_start(&mut state)
        };
        refresh.await
    }

    /// Replace `stale` after the platform rejected it.
    ///
    /// If another caller already replaced it, the newer token is returned
    /// without a second exchange.
    pub async fn force_refresh(&self, stale: &Arc<Token>) -> Result<Arc<Token>, AuthError> {
        let refresh = {
            let mut state = self.lock_state();
            if let Some(token) = &state.current {
                if !Arc::ptr_eq(token, stale) && token.is_usable_at(Utc::now(), self.safety_margin)
                {
                    debug!("Token already refreshed by another caller");
                    return Ok(token.clone());
                }
            }
            if state.inflight.is_none() {
                state.current = None;
            }
            self.join_or_start(&mut state)
        };
        refresh.await
    }

    /// Number of credential exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TokenState> {
        // A panic while holding the lock cannot leave the state half-written.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join_or_start(&self, state: &mut TokenState) -> RefreshFuture {
        if let Some(inflight) = &state.inflight {
            return inflight.clone();
        }

        let credentials = self.credentials.clone();
        let exchanger = self.exchanger.clone();
        let shared_state = self.state.clone();
        let exchanges = self.exchanges.clone();

        let task = tokio::spawn(async move {
            exchanges.fetch_add(1, Ordering::AcqRel);
            let result = exchanger
                .exchange(&credentials)
                .await
                .map(|grant| {
                    let ttl = grant
                        .server_ttl
                        .map_or(credentials.expiry(), |server| server.min(credentials.expiry()));
                    Arc::new(Token::new(grant.token, grant.issued_at, ttl))
                });

            let mut state = shared_state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.inflight = None;
            match &result {
                Ok(token) => {
                    info!(
                        expires_at = %token.expires_at(),
                        "Obtained Lacework API token"
                    );
                    state.current = Some(token.clone());
                }
                Err(e) => warn!(error = %e, "Lacework token exchange failed"),
            }
            result
        });

        let refresh: RefreshFuture = async move {
            task.await.unwrap_or_else(|e| {
                Err(AuthError::Aborted {
                    message: e.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        state.inflight = Some(refresh.clone());
        refresh
    }
}
