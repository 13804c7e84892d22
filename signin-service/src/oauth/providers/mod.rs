//! OAuth provider implementations and the registry of configured providers

pub mod github;
pub mod google;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::oauth::OAuthProvider;
use crate::users::Provider;

use github::GitHubProvider;
use google::GoogleProvider;

/// Providers enabled for sign-in, keyed by [`Provider`]
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider that has credentials in `config.oauth`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        for provider in Provider::ALL {
            let Some(credentials) = config.oauth.provider(provider) else {
                continue;
            };
            let redirect_uri = config.redirect_uri(provider);

            let built: Arc<dyn OAuthProvider> = match provider {
                Provider::GitHub => Arc::new(GitHubProvider::new(credentials, &redirect_uri)?),
                Provider::Google => Arc::new(GoogleProvider::new(credentials, &redirect_uri)?),
            };
            tracing::debug!(provider = %provider, redirect_uri = %redirect_uri, "OAuth provider enabled");
            registry = registry.with(built);
        }

        if registry.providers.is_empty() {
            tracing::warn!("No OAuth providers configured; every sign-in will be rejected");
        }

        Ok(registry)
    }

    /// Register a provider, replacing any previous one of the same kind
    pub fn with(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    /// Look up a configured provider
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn OAuthProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or(Error::ProviderNotConfigured(provider))
    }

    /// Providers that are enabled
    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthProviderConfig;

    #[test]
    fn test_registry_builds_configured_providers_only() {
        let mut config = Config::default();
        config.oauth.google = Some(OAuthProviderConfig::new("google-id", "google-secret"));

        let registry = ProviderRegistry::from_config(&config).unwrap();

        assert_eq!(registry.enabled(), vec![Provider::Google]);
        assert_eq!(
            registry.get(Provider::Google).unwrap().provider(),
            Provider::Google
        );
        assert!(matches!(
            registry.get(Provider::GitHub),
            Err(Error::ProviderNotConfigured(Provider::GitHub))
        ));
    }

    #[test]
    fn test_registry_uses_derived_redirect_uri() {
        let mut config = Config::default();
        config.service.public_url = "https://moveit.example".to_string();
        config.oauth.github = Some(OAuthProviderConfig::new("gh-id", "gh-secret"));

        let registry = ProviderRegistry::from_config(&config).unwrap();
        let url = registry
            .get(Provider::GitHub)
            .unwrap()
            .authorization_url("state", &[]);

        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fmoveit.example%2Fapi%2Fauth%2Fcallback%2Fgithub"
        ));
    }
}
