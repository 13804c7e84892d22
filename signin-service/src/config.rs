//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: SIGNIN_, nested with `__`)
//! 2. Conventional provider credentials: GITHUB_ID, GITHUB_SECRET, GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET
//! 3. Current working directory: ./config.toml
//! 4. XDG config directory: ~/.config/signin-service/{service_name}/config.toml
//! 5. System directory: /etc/signin-service/{service_name}/config.toml
//! 6. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::users::Provider;

const APP_DIR: &str = "signin-service";
const ENV_PREFIX: &str = "SIGNIN_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// OAuth provider configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// User store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Externally visible base URL, used to derive OAuth redirect URIs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl ServiceConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth state TTL in seconds (default: 600 = 10 min)
    #[serde(default = "default_oauth_state_ttl")]
    pub state_ttl_secs: u64,

    /// GitHub credentials; sign-in with GitHub is disabled when absent
    #[serde(default)]
    pub github: Option<OAuthProviderConfig>,

    /// Google credentials; sign-in with Google is disabled when absent
    #[serde(default)]
    pub google: Option<OAuthProviderConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_oauth_state_ttl(),
            github: None,
            google: None,
        }
    }
}

impl OAuthConfig {
    /// Credentials for one provider, if configured
    pub fn provider(&self, provider: Provider) -> Option<&OAuthProviderConfig> {
        match provider {
            Provider::GitHub => self.github.as_ref(),
            Provider::Google => self.google.as_ref(),
        }
    }

    /// State TTL as a Duration
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// Individual OAuth provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI after authentication
    ///
    /// Defaults to `{service.public_url}/api/auth/callback/{provider}`.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// OAuth scopes to request (provider defaults when empty)
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Extra query parameters for the authorization URL
    #[serde(default)]
    pub authorization_params: BTreeMap<String, String>,
}

impl OAuthProviderConfig {
    /// Minimal configuration with provider-default scopes and parameters
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            scopes: Vec::new(),
            authorization_params: BTreeMap::new(),
        }
    }
}

/// Which store holds user records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; for development and tests
    #[default]
    Memory,
    /// SurrealDB document database
    Surrealdb,
}

/// User store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Selected backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// SurrealDB connection, required when `backend = "surrealdb"`
    #[serde(default)]
    pub surrealdb: Option<SurrealDbConfig>,
}

/// SurrealDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrealDbConfig {
    /// Connection URL (ws://, wss://, http://, https://, mem://)
    pub url: String,

    /// Namespace
    #[serde(default = "default_surreal_namespace")]
    pub namespace: String,

    /// Database
    #[serde(default = "default_surreal_database")]
    pub database: String,

    /// Root username
    #[serde(default)]
    pub username: Option<String>,

    /// Root password
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum retry attempts for establishing the connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

// Default value functions

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_oauth_state_ttl() -> u64 {
    600 // 10 minutes
}

fn default_surreal_namespace() -> String {
    "signin".to_string()
}

fn default_surreal_database() -> String {
    "signin".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: APP_DIR.to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
                public_url: default_public_url(),
            },
            oauth: OAuthConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Every config file found is merged, higher entries overriding lower:
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/signin-service/{service_name}/config.toml
    /// 3. System directory: /etc/signin-service/{service_name}/config.toml
    ///
    /// Environment variables override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| APP_DIR.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config = Self::with_env(figment).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses XDG directories. Useful for testing or non-standard deployments.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()));

        let config = Self::with_env(figment).extract()?;
        Ok(config)
    }

    /// Layer provider credential variables, then prefixed variables
    fn with_env(figment: Figment) -> Figment {
        figment
            .merge(Env::raw().filter_map(|key| {
                let mapped = match key.as_str().to_ascii_uppercase().as_str() {
                    "GITHUB_ID" => "oauth.github.client_id",
                    "GITHUB_SECRET" => "oauth.github.client_secret",
                    "GOOGLE_CLIENT_ID" => "oauth.google.client_id",
                    "GOOGLE_CLIENT_SECRET" => "oauth.google.client_secret",
                    _ => return None,
                };
                Some(mapped.into())
            }))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Find all possible config file paths for a service
    ///
    /// Returns paths in priority order (highest first).
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_DIR);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc")
                .join(APP_DIR)
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Redirect URI registered with `provider`
    pub fn redirect_uri(&self, provider: Provider) -> String {
        self.oauth
            .provider(provider)
            .and_then(|p| p.redirect_uri.clone())
            .unwrap_or_else(|| {
                format!(
                    "{}/api/auth/callback/{}",
                    self.service.public_url.trim_end_matches('/'),
                    provider
                )
            })
    }
}
