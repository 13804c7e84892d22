//! # signin-service
//!
//! OAuth sign-in for GitHub and Google that keeps exactly one user record
//! per email address, whichever provider the user picks.
//!
//! ## Features
//!
//! - **Reconciliation**: first sign-in creates the record, later sign-ins
//!   match it by case-folded email and only retag its provider
//! - **OAuth**: GitHub and Google providers, single-use CSRF state
//! - **Stores**: in-memory, or SurrealDB with unique indices (`surrealdb` feature)
//! - **Configuration**: figment layering of defaults, TOML files and environment
//! - **Graceful shutdown**: SIGTERM and SIGINT drain in-flight requests
//!
//! ## Example
//!
//! ```rust,no_run
//! use signin_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = connect_store(&config).await?;
//!     let state = AppState::new(config.clone(), store)?;
//!
//!     Server::new(config).serve(router(state)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;
pub mod users;

#[cfg(feature = "oauth")]
pub mod oauth;

#[cfg(feature = "surrealdb")]
pub mod surrealdb_backend;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{
        Config, OAuthConfig, OAuthProviderConfig, ServiceConfig, StoreBackend, StoreConfig,
        SurrealDbConfig,
    };

    pub use crate::error::{
        DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, ErrorResponse, Result,
    };

    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer, SENSITIVE_HEADERS,
    };
    pub use crate::observability::init_tracing;
    pub use crate::routes::{health, router, HealthResponse};
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use crate::users::{
        casefold, connect_store, GetOrCreate, MemoryUserStore, Profile, Provider, SignInOutcome,
        SignInReconciler, UserRecord, UserStore,
    };

    #[cfg(feature = "surrealdb")]
    pub use crate::users::SurrealUserStore;

    #[cfg(feature = "surrealdb")]
    pub use crate::surrealdb_backend::SurrealClient;

    #[cfg(feature = "oauth")]
    pub use crate::oauth::{
        GitHubProvider, GoogleProvider, MemoryOAuthStateManager, OAuthProvider,
        OAuthStateManager, OAuthTokens, OAuthUserInfo, ProviderRegistry, StateData,
    };

    #[cfg(feature = "oauth")]
    pub use crate::routes::{callback, signin, SignInResponse};

    pub use axum::{extract::State, routing::get, Json, Router};
}
