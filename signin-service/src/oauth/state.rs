//! OAuth state management for CSRF protection
//!
//! A state value is issued when the user is sent to the provider and must
//! come back unchanged on the callback. Each value is single use, expires
//! after the configured TTL, and is bound to the provider that issued it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::users::Provider;

/// Data stored with OAuth state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    /// Provider the authorization request was sent to
    pub provider: Provider,

    /// Where to send the user after a successful sign-in
    pub callback_url: Option<String>,

    /// When this state was created (Unix timestamp)
    pub created_at: i64,
}

impl StateData {
    /// State data stamped with the current time
    pub fn new(provider: Provider, callback_url: Option<String>) -> Self {
        Self {
            provider,
            callback_url,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// OAuth state manager trait
///
/// Implementations store and validate OAuth state values for CSRF protection.
#[async_trait]
pub trait OAuthStateManager: Send + Sync {
    /// Create and store a new state value
    ///
    /// Returns the state string to include in the authorization URL.
    async fn create_state(&self, data: &StateData) -> Result<String, Error>;

    /// Validate and consume a state value
    ///
    /// Returns the associated data if valid, or an error if the state
    /// is invalid, expired, or already used.
    async fn validate_state(&self, state: &str) -> Result<StateData, Error>;
}

/// Generate a cryptographically secure random state value
pub fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    base64_url_encode(&bytes)
}

/// Base64 URL-safe encoding without padding
fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(bytes)
}

/// In-process OAuth state manager
///
/// Suitable for a single instance; states issued by one process cannot be
/// validated by another.
pub struct MemoryOAuthStateManager {
    states: DashMap<String, StateData>,
    ttl: Duration,
}

impl MemoryOAuthStateManager {
    /// Create a manager whose states expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, data: &StateData, now: i64) -> bool {
        now.saturating_sub(data.created_at) >= self.ttl.as_secs() as i64
    }

    /// Drop expired states
    pub fn purge_expired(&self) {
        let now = chrono::Utc::now().timestamp();
        self.states.retain(|_, data| !self.is_expired(data, now));
    }

    /// Number of outstanding states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no states are outstanding
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl OAuthStateManager for MemoryOAuthStateManager {
    async fn create_state(&self, data: &StateData) -> Result<String, Error> {
        self.purge_expired();

        let state = generate_state();
        self.states.insert(state.clone(), data.clone());
        Ok(state)
    }

    async fn validate_state(&self, state: &str) -> Result<StateData, Error> {
        let (_, data) = self
            .states
            .remove(state)
            .ok_or_else(|| Error::InvalidState("Invalid or expired OAuth state".to_string()))?;

        if self.is_expired(&data, chrono::Utc::now().timestamp()) {
            return Err(Error::InvalidState("OAuth state expired".to_string()));
        }

        Ok(data)
    }
}
