//! HTTP routes
//!
//! `/health` is always mounted. With the `oauth` feature the sign-in flow
//! is mounted under `/api/auth`:
//!
//! - `GET /api/auth/signin/{provider}?callback_url=...` issues a state value
//!   and redirects to the provider.
//! - `GET /api/auth/callback/{provider}?code=...&state=...` finishes the
//!   exchange and runs the sign-in reconciler. An accepted sign-in redirects
//!   to the stored callback URL, or answers with the outcome as JSON when
//!   none was given. A denied sign-in answers 403 `ACCESS_DENIED`.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::users::Provider;

#[cfg(feature = "oauth")]
use axum::{
    extract::{Path, Query},
    response::{Redirect, Response},
};

#[cfg(feature = "oauth")]
use crate::error::{Error, Result};
#[cfg(feature = "oauth")]
use crate::oauth::StateData;
#[cfg(feature = "oauth")]
use crate::users::{Profile, SignInOutcome, UserRecord};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Providers accepting sign-ins
    pub providers: Vec<Provider>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    let router = Router::new().route("/health", get(health));

    #[cfg(feature = "oauth")]
    let router = router
        .route("/api/auth/signin/{provider}", get(signin))
        .route("/api/auth/callback/{provider}", get(callback));

    router.with_state(state)
}

/// Liveness probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    #[cfg(feature = "oauth")]
    let providers = state.providers().enabled();
    #[cfg(not(feature = "oauth"))]
    let providers = Vec::new();

    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        providers,
    };

    (StatusCode::OK, Json(response))
}

/// Query string of the signin route
#[cfg(feature = "oauth")]
#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    /// Where to send the user once signed in
    pub callback_url: Option<String>,
}

/// Query string the provider redirects back with
#[cfg(feature = "oauth")]
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange
    pub code: Option<String>,
    /// State value issued by the signin route
    pub state: Option<String>,
    /// Set by the provider when the user declined or the request was invalid
    pub error: Option<String>,
    /// Human-readable detail for `error`
    pub error_description: Option<String>,
}

/// Body of an accepted callback without a callback URL
#[cfg(feature = "oauth")]
#[derive(Debug, Serialize, Deserialize)]
pub struct SignInResponse {
    /// `created` or `matched`
    pub outcome: String,
    /// Whether the stored provider was overwritten
    pub provider_updated: bool,
    /// The user record the session belongs to
    pub user: UserRecord,
}

#[cfg(feature = "oauth")]
impl From<SignInOutcome> for SignInResponse {
    fn from(outcome: SignInOutcome) -> Self {
        match outcome {
            SignInOutcome::Created { user } => Self {
                outcome: "created".to_string(),
                provider_updated: false,
                user,
            },
            SignInOutcome::Matched {
                user,
                provider_updated,
            } => Self {
                outcome: "matched".to_string(),
                provider_updated,
                user,
            },
        }
    }
}

/// Start a sign-in: redirect to the provider's authorization page
#[cfg(feature = "oauth")]
pub async fn signin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SignInQuery>,
) -> Result<Redirect> {
    let provider: Provider = provider.parse()?;
    let oauth_provider = state.providers().get(provider)?;

    if let Some(callback_url) = &query.callback_url {
        if !is_allowed_callback(&state.config().service.public_url, callback_url) {
            return Err(Error::BadRequest(format!(
                "callback_url '{}' is not on this site",
                callback_url
            )));
        }
    }

    let oauth_state = state
        .oauth_states()
        .create_state(&StateData::new(provider, query.callback_url))
        .await?;

    tracing::debug!(provider = %provider, "Redirecting to identity provider");
    Ok(Redirect::to(
        &oauth_provider.authorization_url(&oauth_state, &[]),
    ))
}

/// Finish a sign-in: exchange the code and reconcile the user record
#[cfg(feature = "oauth")]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    let provider: Provider = provider.parse()?;

    if let Some(error) = query.error {
        tracing::warn!(
            provider = %provider,
            error = %error,
            description = ?query.error_description,
            "Identity provider rejected the sign-in"
        );
        return Err(Error::Unauthorized(format!(
            "{} sign-in failed: {}",
            provider, error
        )));
    }

    let (code, oauth_state) = match (query.code, query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => {
            return Err(Error::BadRequest(
                "callback requires both code and state".to_string(),
            ))
        }
    };

    let data = state.oauth_states().validate_state(&oauth_state).await?;
    if data.provider != provider {
        return Err(Error::InvalidState(format!(
            "state was issued for {}, not {}",
            data.provider, provider
        )));
    }

    let oauth_provider = state.providers().get(provider)?;
    let tokens = oauth_provider.exchange_code(&code).await?;
    let user_info = oauth_provider.get_user_info(&tokens.access_token).await?;

    let outcome = match Profile::try_from(user_info) {
        Ok(profile) => state.reconciler().admit(&profile, provider).await,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Sign-in denied");
            None
        }
    };
    let outcome = outcome.ok_or_else(|| Error::Forbidden("Sign-in was denied".to_string()))?;

    Ok(match data.callback_url {
        Some(callback_url) => Redirect::to(&callback_url).into_response(),
        None => Json(SignInResponse::from(outcome)).into_response(),
    })
}

/// Relative paths and URLs under the public URL
///
/// Browsers treat `\` as `/` and drop tabs and newlines from URLs, so any
/// value containing either is refused.
#[cfg(feature = "oauth")]
fn is_allowed_callback(public_url: &str, callback_url: &str) -> bool {
    if callback_url.chars().any(|c| c == '\\' || c.is_control()) {
        return false;
    }

    if callback_url.starts_with('/') {
        return !callback_url.starts_with("//");
    }

    let base = public_url.trim_end_matches('/');
    callback_url == base || callback_url.starts_with(&format!("{}/", base))
}
