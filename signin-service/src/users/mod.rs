//! User records and sign-in reconciliation
//!
//! One [`UserRecord`] exists per case-folded email. A sign-in either
//! creates it (first visit through any provider) or matches it by email,
//! rewriting only its `provider` tag when the user switched providers.

pub mod memory;
pub mod model;
pub mod reconcile;
pub mod store;

#[cfg(feature = "surrealdb")]
pub mod surreal;

pub use memory::MemoryUserStore;
pub use model::{casefold, Profile, Provider, UserRecord};
pub use reconcile::{SignInOutcome, SignInReconciler};
pub use store::{GetOrCreate, UserStore};

#[cfg(feature = "surrealdb")]
pub use surreal::SurrealUserStore;

use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::error::{Error, Result};

/// Open the user store selected by `store.backend`
pub async fn connect_store(config: &Config) -> Result<Arc<dyn UserStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; records are lost on restart");
            Ok(Arc::new(MemoryUserStore::new()))
        }
        #[cfg(feature = "surrealdb")]
        StoreBackend::Surrealdb => {
            let surreal_config = config.store.surrealdb.as_ref().ok_or_else(|| {
                Error::Internal(
                    "store.backend is 'surrealdb' but no [store.surrealdb] section is configured"
                        .to_string(),
                )
            })?;
            let client = crate::surrealdb_backend::create_client(surreal_config).await?;
            let store = SurrealUserStore::new(Arc::new(client));
            store.initialize().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "surrealdb"))]
        StoreBackend::Surrealdb => Err(Error::NotSupported(
            "store.backend 'surrealdb' requires the `surrealdb` feature".to_string(),
        )),
    }
}
