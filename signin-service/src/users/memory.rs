//! In-memory user store
//!
//! All three maps sit behind one lock, so `get_or_create` checks both
//! indices and inserts without interleaving.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::users::store::{GetOrCreate, UserStore};
use crate::users::{casefold, Provider, UserRecord};

#[derive(Debug, Default)]
struct Collection {
    /// Records keyed by the id they were created under
    records: HashMap<String, UserRecord>,
    /// `user_by_id`: case-folded id -> record key
    by_id: HashMap<String, String>,
    /// `user_by_email`: case-folded email -> record key
    by_email: HashMap<String, String>,
}

impl Collection {
    fn lookup(&self, index: &HashMap<String, String>, key: &str) -> Option<&UserRecord> {
        index.get(key).and_then(|ref_key| self.records.get(ref_key))
    }
}

/// User store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<Collection>,
}

impl MemoryUserStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.users.read().await.records.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_or_create(&self, candidate: UserRecord) -> Result<GetOrCreate> {
        let id_key = candidate.id_key();
        let email_key = candidate.email_key();

        let mut users = self.users.write().await;

        if let Some(existing) = users.lookup(&users.by_email, &email_key) {
            return Ok(GetOrCreate::Existing(existing.clone()));
        }

        if users.by_id.contains_key(&id_key) || users.records.contains_key(&candidate.id) {
            return Err(Error::IdentityConflict { id: id_key });
        }

        users.by_id.insert(id_key, candidate.id.clone());
        users.by_email.insert(email_key, candidate.id.clone());
        users.records.insert(candidate.id.clone(), candidate.clone());

        Ok(GetOrCreate::Created(candidate))
    }

    async fn update_provider(&self, id: &str, provider: Provider) -> Result<UserRecord> {
        let mut users = self.users.write().await;

        let record = users.records.get_mut(id).ok_or_else(|| {
            Error::Database(
                DatabaseError::not_found(DatabaseOperation::Update, "user record not found")
                    .add_context(format!("users:{}", id)),
            )
        })?;

        record.provider = provider;
        Ok(record.clone())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.lookup(&users.by_email, &casefold(email)).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.lookup(&users.by_id, &casefold(id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::Profile;
    use std::sync::Arc;

    fn record(id: &str, email: &str, provider: Provider) -> UserRecord {
        UserRecord::first_sign_in(
            &Profile {
                id: id.to_string(),
                name: "Ada".to_string(),
                login: "ada".to_string(),
                email: email.to_string(),
                avatar_url: "https://avatars.example/ada".to_string(),
            },
            provider,
        )
    }

    #[tokio::test]
    async fn test_creates_when_absent() {
        let store = MemoryUserStore::new();
        let outcome = store
            .get_or_create(record("42", "a@x.com", Provider::GitHub))
            .await
            .unwrap();

        assert!(matches!(outcome, GetOrCreate::Created(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_existing_email_is_returned_case_insensitively() {
        let store = MemoryUserStore::new();
        store
            .get_or_create(record("42", "a@x.com", Provider::GitHub))
            .await
            .unwrap();

        let outcome = store
            .get_or_create(record("google-sub", "A@X.COM", Provider::Google))
            .await
            .unwrap();

        match outcome {
            GetOrCreate::Existing(existing) => {
                assert_eq!(existing.id, "42");
                assert_eq!(existing.provider, Provider::GitHub);
            }
            other => panic!("expected existing record, got {:?}", other),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_id_match_without_email_match_conflicts() {
        let store = MemoryUserStore::new();
        store
            .get_or_create(record("42", "a@x.com", Provider::GitHub))
            .await
            .unwrap();

        let result = store
            .get_or_create(record("42", "other@x.com", Provider::Google))
            .await;

        assert!(matches!(result, Err(Error::IdentityConflict { ref id }) if id == "42"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_provider_only_touches_provider() {
        let store = MemoryUserStore::new();
        let original = store
            .get_or_create(record("42", "a@x.com", Provider::GitHub))
            .await
            .unwrap()
            .into_record();

        let updated = store.update_provider("42", Provider::Google).await.unwrap();

        assert_eq!(updated.provider, Provider::Google);
        assert_eq!(
            UserRecord {
                provider: Provider::GitHub,
                ..updated.clone()
            },
            original
        );
        assert_eq!(
            store.find_by_email("a@x.com").await.unwrap(),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn test_update_provider_missing_record() {
        let store = MemoryUserStore::new();
        let err = store
            .update_provider("missing", Provider::Google)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Database(ref e) if e.kind == crate::error::DatabaseErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_find_by_id_is_case_insensitive() {
        let store = MemoryUserStore::new();
        store
            .get_or_create(record("AbC", "a@x.com", Provider::Google))
            .await
            .unwrap();

        assert!(store.find_by_id("abc").await.unwrap().is_some());
        assert!(store.find_by_id("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_sign_ins_create_one_record() {
        let store = Arc::new(MemoryUserStore::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let email = if i % 2 == 0 { "a@x.com" } else { "A@x.COM" };
                    store
                        .get_or_create(record("42", email, Provider::GitHub))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let GetOrCreate::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }
}
