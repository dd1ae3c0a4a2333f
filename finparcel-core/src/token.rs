//! Lazily acquired per-carrier session tokens.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::ports::PortError;

#[derive(Clone, PartialEq, Eq)]
/// Opaque session token returned by a carrier login.
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token, rejecting blank values.
    #[must_use]
    pub fn new<S: Into<String>>(raw: S) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    /// Raw token value for request headers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SessionToken(***)")
    }
}

/// Holds at most one session token for a carrier.
///
/// There is no expiry; the owner calls [`TokenCache::invalidate`] after any
/// failed use so that the next run logs in again.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<SessionToken>>,
}

impl TokenCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently cached token, if any.
    #[must_use]
    pub fn cached(&self) -> Option<SessionToken> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the cached token or run `login` once to obtain a new one.
    ///
    /// # Errors
    ///
    /// Propagates the login error; the cache stays empty in that case.
    pub async fn get_or_login<F, Fut>(&self, login: F) -> Result<SessionToken, PortError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionToken, PortError>>,
    {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let token = login().await?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
