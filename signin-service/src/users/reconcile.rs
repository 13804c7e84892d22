//! Sign-in reconciliation
//!
//! Runs after the identity provider has authenticated the user. Ensures a
//! single [`UserRecord`] exists for the profile's email and keeps its
//! `provider` tag pointing at the provider used for the latest sign-in.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signin_service::users::{MemoryUserStore, Provider, SignInReconciler};
//!
//! let reconciler = SignInReconciler::new(Arc::new(MemoryUserStore::new()));
//!
//! // Typed outcome for callers that need to tell the cases apart
//! let outcome = reconciler.reconcile(&profile, Provider::GitHub).await?;
//!
//! // Outcome of an accepted sign-in, `None` once denied
//! let admitted = reconciler.admit(&profile, Provider::GitHub).await;
//!
//! // Accept/deny decision for the sign-in hook
//! let allowed = reconciler.sign_in(&profile, Provider::GitHub).await;
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::users::store::{GetOrCreate, UserStore};
use crate::users::{Profile, Provider, UserRecord};

/// What a successful reconciliation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignInOutcome {
    /// First sign-in for this email; a new record was stored
    Created {
        /// The new record
        user: UserRecord,
    },

    /// The email already had a record
    Matched {
        /// The record after any provider update
        user: UserRecord,
        /// Whether the stored provider was overwritten
        provider_updated: bool,
    },
}

impl SignInOutcome {
    /// The user record the session belongs to
    pub fn user(&self) -> &UserRecord {
        match self {
            Self::Created { user } | Self::Matched { user, .. } => user,
        }
    }

    /// Whether this sign-in created the record
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    /// Whether this sign-in rewrote the stored provider
    pub fn provider_updated(&self) -> bool {
        matches!(
            self,
            Self::Matched {
                provider_updated: true,
                ..
            }
        )
    }
}

/// Ensures one user record per email for every accepted sign-in
#[derive(Clone)]
pub struct SignInReconciler {
    store: Arc<dyn UserStore>,
}

impl SignInReconciler {
    /// Create a reconciler writing to `store`
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Create or match the user record for `profile`
    ///
    /// 1. Atomic get-or-create keyed by the case-folded id and email.
    /// 2. If the resulting record names a different provider, overwrite
    ///    only its `provider` field. This second write is not atomic with
    ///    the first; concurrent sign-ins for one email resolve to the last
    ///    writer's provider.
    pub async fn reconcile(&self, profile: &Profile, provider: Provider) -> Result<SignInOutcome> {
        profile.ensure_indexable()?;

        let candidate = UserRecord::first_sign_in(profile, provider);

        match self.store.get_or_create(candidate).await? {
            GetOrCreate::Created(user) => {
                tracing::info!(
                    user_id = %user.id,
                    provider = %provider,
                    "Created user record on first sign-in"
                );
                Ok(SignInOutcome::Created { user })
            }
            GetOrCreate::Existing(user) if user.provider == provider => {
                tracing::debug!(
                    user_id = %user.id,
                    provider = %provider,
                    "Matched existing user record"
                );
                Ok(SignInOutcome::Matched {
                    user,
                    provider_updated: false,
                })
            }
            GetOrCreate::Existing(user) => {
                let previous = user.provider;
                let user = self.store.update_provider(&user.id, provider).await?;
                tracing::info!(
                    user_id = %user.id,
                    from = %previous,
                    to = %provider,
                    "Updated stored provider for returning user"
                );
                Ok(SignInOutcome::Matched {
                    user,
                    provider_updated: true,
                })
            }
        }
    }

    /// Reconcile `profile`, collapsing any error into a logged denial
    ///
    /// `Some` carries the outcome of an accepted sign-in. Every error,
    /// whatever its cause, denies the sign-in and yields `None`.
    pub async fn admit(&self, profile: &Profile, provider: Provider) -> Option<SignInOutcome> {
        match self.reconcile(profile, provider).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    error = %e,
                    "Sign-in denied"
                );
                None
            }
        }
    }

    /// Sign-in hook: `true` allows the session, `false` rejects it
    pub async fn sign_in(&self, profile: &Profile, provider: Provider) -> bool {
        self.admit(profile, provider).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, DatabaseOperation, Error};
    use crate::users::MemoryUserStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(id: &str, email: &str) -> Profile {
        Profile {
            id: id.to_string(),
            name: "Ada Lovelace".to_string(),
            login: "ada".to_string(),
            email: email.to_string(),
            avatar_url: "https://avatars.example/ada".to_string(),
        }
    }

    /// Counts writes and can be told to fail a given operation
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryUserStore,
        creates: AtomicUsize,
        provider_updates: AtomicUsize,
        fail_get_or_create: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl UserStore for RecordingStore {
        async fn get_or_create(&self, candidate: UserRecord) -> Result<GetOrCreate> {
            if self.fail_get_or_create {
                return Err(DatabaseError::connection_failed("database unavailable").into());
            }
            let outcome = self.inner.get_or_create(candidate).await?;
            if let GetOrCreate::Created(_) = outcome {
                self.creates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(outcome)
        }

        async fn update_provider(&self, id: &str, provider: Provider) -> Result<UserRecord> {
            if self.fail_update {
                return Err(DatabaseError::query_failed("write rejected").into());
            }
            self.provider_updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update_provider(id, provider).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
            self.inner.find_by_id(id).await
        }
    }

    fn reconciler_with(store: RecordingStore) -> (SignInReconciler, Arc<RecordingStore>) {
        let store = Arc::new(store);
        (SignInReconciler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_record() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());

        let outcome = reconciler
            .reconcile(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();

        assert!(outcome.is_created());
        let user = outcome.user();
        assert_eq!(user.id, "42");
        assert_eq!(user.provider, Provider::GitHub);
        assert_eq!(user.level, 1);
        assert_eq!(user.current_experience, 0);
        assert_eq!(user.challenges_completed, 0);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.provider_updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_provider_performs_no_write() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());
        let ada = profile("42", "a@x.com");

        reconciler.reconcile(&ada, Provider::GitHub).await.unwrap();
        let outcome = reconciler.reconcile(&ada, Provider::GitHub).await.unwrap();

        assert_eq!(
            outcome,
            SignInOutcome::Matched {
                user: UserRecord::first_sign_in(&ada, Provider::GitHub),
                provider_updated: false,
            }
        );
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.provider_updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_switch_updates_only_provider() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());

        reconciler
            .reconcile(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();

        let outcome = reconciler
            .reconcile(&profile("1098765", "A@X.com"), Provider::Google)
            .await
            .unwrap();

        assert!(outcome.provider_updated());
        let user = outcome.user();
        assert_eq!(user.id, "42");
        assert_eq!(user.provider, Provider::Google);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.level, 1);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.provider_updates.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_returning_user_keeps_original_profile_attributes() {
        let (reconciler, _store) = reconciler_with(RecordingStore::default());

        reconciler
            .reconcile(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();

        let mut renamed = profile("42", "a@x.com");
        renamed.name = "Countess of Lovelace".to_string();
        let outcome = reconciler.reconcile(&renamed, Provider::GitHub).await.unwrap();

        assert_eq!(outcome.user().name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_sign_in_accepts_and_switches_provider() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());

        assert!(reconciler.sign_in(&profile("42", "a@x.com"), Provider::GitHub).await);
        assert!(reconciler.sign_in(&profile("g-7", "A@X.com"), Provider::Google).await);

        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.provider, Provider::Google);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_denies_sign_in() {
        let (reconciler, store) = reconciler_with(RecordingStore {
            fail_get_or_create: true,
            ..Default::default()
        });

        assert!(!reconciler.sign_in(&profile("42", "a@x.com"), Provider::GitHub).await);
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_provider_update_failure_denies_sign_in() {
        let (reconciler, store) = reconciler_with(RecordingStore {
            fail_update: true,
            ..Default::default()
        });

        assert!(reconciler.sign_in(&profile("42", "a@x.com"), Provider::GitHub).await);
        assert!(!reconciler.sign_in(&profile("g-7", "a@x.com"), Provider::Google).await);

        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.provider, Provider::GitHub);
    }

    #[tokio::test]
    async fn test_admit_returns_outcome_or_denies() {
        let (reconciler, _store) = reconciler_with(RecordingStore::default());

        let outcome = reconciler
            .admit(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();
        assert!(outcome.is_created());

        let outcome = reconciler
            .admit(&profile("g-7", "A@x.com"), Provider::Google)
            .await
            .unwrap();
        assert!(outcome.provider_updated());
        assert_eq!(outcome.user().id, "42");

        assert!(reconciler
            .admit(&profile("42", "b@x.com"), Provider::Google)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_id_conflict_is_denied() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());

        reconciler
            .reconcile(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();

        let err = reconciler
            .reconcile(&profile("42", "b@x.com"), Provider::Google)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));
        assert!(!reconciler.sign_in(&profile("42", "b@x.com"), Provider::Google).await);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_profile_is_denied_before_store_access() {
        let (reconciler, store) = reconciler_with(RecordingStore::default());

        let err = reconciler
            .reconcile(&profile("42", ""), Provider::GitHub)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedProfile(_)));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outcome_serializes_with_tag() {
        let (reconciler, _store) = reconciler_with(RecordingStore::default());
        let outcome = reconciler
            .reconcile(&profile("42", "a@x.com"), Provider::GitHub)
            .await
            .unwrap();

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "created");
        assert_eq!(value["user"]["provider"], "github");
    }

    #[test]
    fn test_database_error_message_names_operation() {
        let err: Error = DatabaseError::not_found(DatabaseOperation::Update, "gone").into();
        assert!(err.to_string().contains("update"));
    }
}
