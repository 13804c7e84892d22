//! SurrealDB-backed user store (requires `surrealdb` feature)
//!
//! Records live in the `users` table under `users:<profile id>`. The
//! case-folded id and email are stored alongside each document and indexed
//! as `user_by_id` and `user_by_email`, both UNIQUE, so a concurrent
//! duplicate create fails inside the database instead of racing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::surrealdb_backend::SurrealClient;
use crate::users::store::{GetOrCreate, UserStore};
use crate::users::{casefold, Provider, UserRecord};

const SCHEMA: &str = "
    DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS user_by_id ON users FIELDS id_key UNIQUE;
    DEFINE INDEX IF NOT EXISTS user_by_email ON users FIELDS email_key UNIQUE;
";

const USER_FIELDS: &str = "user_id, provider, name, login, email, avatar_url, level, \
                           currentExperience, challengesCompleted";

/// Create attempts before giving up on a record that keeps conflicting
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Stored document; `id` is reserved for the record id
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    user_id: String,
    provider: Provider,
    name: String,
    login: String,
    email: String,
    avatar_url: String,
    level: i64,
    #[serde(rename = "currentExperience")]
    current_experience: i64,
    #[serde(rename = "challengesCompleted")]
    challenges_completed: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email_key: Option<String>,
}

impl From<&UserRecord> for UserDocument {
    fn from(record: &UserRecord) -> Self {
        Self {
            user_id: record.id.clone(),
            provider: record.provider,
            name: record.name.clone(),
            login: record.login.clone(),
            email: record.email.clone(),
            avatar_url: record.avatar_url.clone(),
            level: record.level,
            current_experience: record.current_experience,
            challenges_completed: record.challenges_completed,
            id_key: Some(record.id_key()),
            email_key: Some(record.email_key()),
        }
    }
}

impl From<UserDocument> for UserRecord {
    fn from(doc: UserDocument) -> Self {
        Self {
            id: doc.user_id,
            provider: doc.provider,
            name: doc.name,
            login: doc.login,
            email: doc.email,
            avatar_url: doc.avatar_url,
            level: doc.level,
            current_experience: doc.current_experience,
            challenges_completed: doc.challenges_completed,
        }
    }
}

/// User store backed by SurrealDB
#[derive(Clone)]
pub struct SurrealUserStore {
    client: Arc<SurrealClient>,
}

impl SurrealUserStore {
    /// Wrap a connected client
    pub fn new(client: Arc<SurrealClient>) -> Self {
        Self { client }
    }

    /// Define the `users` table and its indices
    pub async fn initialize(&self) -> Result<()> {
        self.client
            .query(SCHEMA)
            .await
            .and_then(|response| response.check())
            .map_err(|e| {
                DatabaseError::new(
                    DatabaseOperation::Migration,
                    DatabaseError::from(e).kind,
                    "Failed to define users table",
                )
                .add_context("users")
            })?;

        tracing::debug!("users table and indices defined");
        Ok(())
    }

    async fn find_by(&self, field: &'static str, value: String) -> Result<Option<UserRecord>> {
        let statement = format!(
            "SELECT {} FROM users WHERE {} = $value LIMIT 1",
            USER_FIELDS, field
        );

        let mut response = self
            .client
            .query(statement)
            .bind(("value", value))
            .await
            .map_err(|e| DatabaseError::from(e).add_context(field))?;

        let doc: Option<UserDocument> = response
            .take(0)
            .map_err(|e| DatabaseError::from(e).add_context(field))?;

        Ok(doc.map(UserRecord::from))
    }

    async fn create(&self, candidate: &UserRecord) -> Result<()> {
        self.client
            .query("CREATE type::thing('users', $key) CONTENT $data RETURN NONE")
            .bind(("key", candidate.id.clone()))
            .bind(("data", UserDocument::from(candidate)))
            .await
            .and_then(|response| response.check())
            .map_err(|e| {
                let err = DatabaseError::from(e);
                DatabaseError::new(DatabaseOperation::Insert, err.kind, err.message)
                    .add_context(format!("users:{}", candidate.id))
            })?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for SurrealUserStore {
    async fn get_or_create(&self, candidate: UserRecord) -> Result<GetOrCreate> {
        let id_key = candidate.id_key();
        let email_key = candidate.email_key();

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            if let Some(existing) = self.find_by("email_key", email_key.clone()).await? {
                return Ok(GetOrCreate::Existing(existing));
            }

            if self.find_by("id_key", id_key.clone()).await?.is_some() {
                return Err(Error::IdentityConflict { id: id_key });
            }

            match self.create(&candidate).await {
                Ok(()) => return Ok(GetOrCreate::Created(candidate)),
                Err(Error::Database(e)) if e.is_constraint_violation() => {
                    tracing::debug!(
                        attempt,
                        id = %id_key,
                        "Concurrent sign-in claimed the record first; re-reading"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(DatabaseError::constraint_violation(
            DatabaseOperation::Insert,
            "record kept conflicting with concurrent writers",
        )
        .add_context(format!("users:{}", candidate.id))
        .into())
    }

    async fn update_provider(&self, id: &str, provider: Provider) -> Result<UserRecord> {
        let statement = format!(
            "UPDATE type::thing('users', $key) SET provider = $provider RETURN {}",
            USER_FIELDS
        );

        let mut response = self
            .client
            .query(statement)
            .bind(("key", id.to_string()))
            .bind(("provider", provider))
            .await
            .map_err(|e| DatabaseError::from(e).add_context(format!("users:{}", id)))?;

        let doc: Option<UserDocument> = response
            .take(0)
            .map_err(|e| DatabaseError::from(e).add_context(format!("users:{}", id)))?;

        doc.map(UserRecord::from).ok_or_else(|| {
            DatabaseError::not_found(DatabaseOperation::Update, "user record not found")
                .add_context(format!("users:{}", id))
                .into()
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.find_by("email_key", casefold(email)).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        self.find_by("id_key", casefold(id)).await
    }
}
