//! User store trait

use async_trait::async_trait;

use crate::error::Result;
use crate::users::{Provider, UserRecord};

/// Outcome of [`UserStore::get_or_create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOrCreate {
    /// Neither the id nor the email existed; the candidate was stored
    Created(UserRecord),

    /// A record with the same case-folded email already existed
    Existing(UserRecord),
}

impl GetOrCreate {
    /// Take the stored record
    pub fn into_record(self) -> UserRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }
}

/// Persistent collection of user records
///
/// Records are looked up through two case-folded indices, `user_by_id` and
/// `user_by_email`. Implementations must never hold two records with the
/// same case-folded email.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Atomically create `candidate` or fetch the record sharing its email
    ///
    /// Creates when no record matches the candidate's case-folded id and no
    /// record matches its case-folded email. Otherwise returns the record
    /// matched by email. If only the id matches, fails with
    /// [`Error::IdentityConflict`](crate::error::Error::IdentityConflict).
    async fn get_or_create(&self, candidate: UserRecord) -> Result<GetOrCreate>;

    /// Overwrite the `provider` field of the record stored under `id`
    ///
    /// Returns the updated record. Fails with a not-found database error if
    /// no record is stored under `id`.
    async fn update_provider(&self, id: &str, provider: Provider) -> Result<UserRecord>;

    /// Look up a record through the `user_by_email` index
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Look up a record through the `user_by_id` index
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>>;
}
