//! OAuth provider integration (requires `oauth` feature)
//!
//! Sends users to GitHub or Google, exchanges the returned code and turns
//! the provider's user info into a [`Profile`](crate::users::Profile) for
//! the sign-in reconciler.
//!
//! # Example
//!
//! ```rust,ignore
//! use signin_service::config::OAuthProviderConfig;
//! use signin_service::oauth::{GoogleProvider, OAuthProvider};
//!
//! let config = OAuthProviderConfig::new("your-client-id", "your-secret");
//! let provider = GoogleProvider::new(&config, "https://example.com/api/auth/callback/google")?;
//!
//! // Generate authorization URL
//! let auth_url = provider.authorization_url("state-value", &[]);
//!
//! // After callback, exchange code for tokens
//! let tokens = provider.exchange_code("authorization-code").await?;
//!
//! // Get user info
//! let user_info = provider.get_user_info(&tokens.access_token).await?;
//! ```

pub mod provider;
pub mod providers;
pub mod state;

// Core trait and types
pub use provider::{OAuthProvider, OAuthTokens, OAuthUserInfo};

// Provider implementations
pub use providers::{github::GitHubProvider, google::GoogleProvider, ProviderRegistry};

// State management
pub use state::{generate_state, MemoryOAuthStateManager, OAuthStateManager, StateData};
