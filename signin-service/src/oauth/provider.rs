//! OAuth provider trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::users::{Profile, Provider};

/// OAuth tokens received from a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Access token from the provider
    pub access_token: String,

    /// Refresh token (Google issues one with `access_type=offline`)
    pub refresh_token: Option<String>,

    /// Token lifetime in seconds (if provided)
    pub expires_in: Option<i64>,

    /// Token type (usually "Bearer")
    pub token_type: String,
}

/// Normalized user info from OAuth providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    /// Provider that returned this info
    pub provider: Provider,

    /// User ID from the provider
    pub provider_user_id: String,

    /// User's email address
    pub email: Option<String>,

    /// Whether the email is verified
    pub email_verified: bool,

    /// User's display name
    pub name: Option<String>,

    /// Login handle
    pub login: Option<String>,

    /// User's profile picture URL
    pub picture: Option<String>,

    /// Raw provider-specific data
    pub raw: serde_json::Value,
}

impl TryFrom<OAuthUserInfo> for Profile {
    type Error = Error;

    fn try_from(info: OAuthUserInfo) -> Result<Self, Self::Error> {
        let email = info.email.ok_or_else(|| {
            Error::MalformedProfile(format!("{} profile has no email address", info.provider))
        })?;

        // Records are matched by email, so an unverified address is refused
        if !info.email_verified {
            return Err(Error::MalformedProfile(format!(
                "{} profile email is not verified",
                info.provider
            )));
        }

        // Google has no handle; fall back to the mailbox name
        let login = info
            .login
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(Profile {
            id: info.provider_user_id,
            name: info.name.unwrap_or_else(|| login.clone()),
            login,
            email,
            avatar_url: info.picture.unwrap_or_default(),
        })
    }
}

/// OAuth provider trait
///
/// Implementations provide integration with specific OAuth providers.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Which provider this is
    fn provider(&self) -> Provider;

    /// Generate the authorization URL for redirecting users
    ///
    /// # Arguments
    ///
    /// * `state` - CSRF protection state value
    /// * `scopes` - Additional scopes to request
    fn authorization_url(&self, state: &str, scopes: &[String]) -> String;

    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, Error>;

    /// Get user information using an access token
    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, Error>;
}
