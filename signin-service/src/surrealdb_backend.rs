//! SurrealDB connection management
//!
//! The URL scheme picks the protocol at runtime:
//! - `ws://` / `wss://` - WebSocket connections
//! - `http://` / `https://` - HTTP connections
//! - `mem://` - In-memory database (for testing)

use std::time::Duration;

use crate::config::SurrealDbConfig;
use crate::error::{DatabaseError, Result};

/// SurrealDB client using the `Any` engine for runtime protocol selection
pub type SurrealClient = surrealdb::Surreal<surrealdb::engine::any::Any>;

/// Connect, authenticate and select namespace/database, retrying with
/// exponential backoff up to `config.max_retries` times
pub(crate) async fn create_client(config: &SurrealDbConfig) -> Result<SurrealClient> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_client(config).await {
            Ok(client) => {
                tracing::info!(
                    url = %sanitize_connection_url(&config.url),
                    namespace = %config.namespace,
                    database = %config.database,
                    attempts = attempt + 1,
                    "SurrealDB connected"
                );
                return Ok(client);
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to SurrealDB after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));

                tracing::warn!(
                    "SurrealDB connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Single connection attempt
async fn try_create_client(config: &SurrealDbConfig) -> Result<SurrealClient> {
    let url_safe = sanitize_connection_url(&config.url);
    tracing::debug!("Connecting to SurrealDB: {}", url_safe);

    let client = surrealdb::engine::any::connect(&config.url)
        .await
        .map_err(|e| {
            DatabaseError::connection_failed(format!(
                "{} at '{}': {}",
                categorize_surrealdb_error(&e),
                url_safe,
                e
            ))
        })?;

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        client
            .signin(surrealdb::opt::auth::Root { username, password })
            .await
            .map_err(|e| {
                DatabaseError::connection_failed(format!(
                    "{} while signing in to '{}': {}",
                    categorize_surrealdb_error(&e),
                    url_safe,
                    e
                ))
            })?;
    }

    client
        .use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            DatabaseError::connection_failed(format!(
                "{} while selecting '{}/{}': {}",
                categorize_surrealdb_error(&e),
                config.namespace,
                config.database,
                e
            ))
        })?;

    Ok(client)
}

/// Strip credentials from a connection URL before logging it
fn sanitize_connection_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..=scheme_end + 2];
            let after_at = &url[at_pos..];
            return format!("{}***{}", scheme, after_at);
        }
    }
    url.to_string()
}

fn categorize_surrealdb_error(err: &surrealdb::Error) -> &'static str {
    let err_str = err.to_string().to_lowercase();

    if err_str.contains("auth") || err_str.contains("credentials") || err_str.contains("signin") {
        "Authentication error"
    } else if err_str.contains("connect")
        || err_str.contains("network")
        || err_str.contains("dns")
        || err_str.contains("refused")
    {
        "Network connection error"
    } else if err_str.contains("permission") || err_str.contains("not allowed") {
        "Permission error"
    } else if err_str.contains("timeout") {
        "Connection timeout"
    } else {
        "Connection error"
    }
}
