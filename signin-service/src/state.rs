//! Application state shared across handlers

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::users::{SignInReconciler, UserStore};

#[cfg(feature = "oauth")]
use crate::oauth::{MemoryOAuthStateManager, OAuthStateManager, ProviderRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    reconciler: SignInReconciler,
    #[cfg(feature = "oauth")]
    providers: ProviderRegistry,
    #[cfg(feature = "oauth")]
    oauth_states: Arc<dyn OAuthStateManager>,
}

impl AppState {
    /// Build state from configuration and an open user store
    ///
    /// Providers are built from `config.oauth`; OAuth states are kept in
    /// process memory for `oauth.state_ttl_secs`.
    pub fn new(config: Config, store: Arc<dyn UserStore>) -> Result<Self> {
        #[cfg(feature = "oauth")]
        let providers = ProviderRegistry::from_config(&config)?;
        #[cfg(feature = "oauth")]
        let oauth_states: Arc<dyn OAuthStateManager> =
            Arc::new(MemoryOAuthStateManager::new(config.oauth.state_ttl()));

        Ok(Self {
            config: Arc::new(config),
            reconciler: SignInReconciler::new(store),
            #[cfg(feature = "oauth")]
            providers,
            #[cfg(feature = "oauth")]
            oauth_states,
        })
    }

    /// Replace the provider registry
    #[cfg(feature = "oauth")]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Replace the OAuth state manager
    #[cfg(feature = "oauth")]
    pub fn with_state_manager(mut self, manager: Arc<dyn OAuthStateManager>) -> Self {
        self.oauth_states = manager;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the sign-in reconciler
    pub fn reconciler(&self) -> &SignInReconciler {
        &self.reconciler
    }

    /// Get the configured OAuth providers
    #[cfg(feature = "oauth")]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Get the OAuth state manager
    #[cfg(feature = "oauth")]
    pub fn oauth_states(&self) -> &Arc<dyn OAuthStateManager> {
        &self.oauth_states
    }
}
