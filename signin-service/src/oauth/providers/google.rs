//! Google OAuth provider implementation
//!
//! Always asks Google to show the consent screen and to issue a refresh
//! token (`prompt=consent`, `access_type=offline`) unless the configuration
//! overrides those parameters.

use async_trait::async_trait;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use std::collections::BTreeMap;

use super::github::ConfiguredClient;
use crate::config::OAuthProviderConfig;
use crate::error::Error;
use crate::oauth::{OAuthProvider, OAuthTokens, OAuthUserInfo};
use crate::users::Provider;

/// Google OAuth provider
#[derive(Clone)]
pub struct GoogleProvider {
    client: ConfiguredClient,
    http_client: HttpClient,
    default_scopes: Vec<String>,
    authorization_params: BTreeMap<String, String>,
}

impl GoogleProvider {
    /// Create a new Google OAuth provider from configuration
    pub fn new(config: &OAuthProviderConfig, redirect_uri: &str) -> Result<Self, Error> {
        let client = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new("https://accounts.google.com/o/oauth2/v2/auth".to_string())
                    .map_err(|e| Error::Internal(format!("Invalid Google auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
                    .map_err(|e| Error::Internal(format!("Invalid Google token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string())
                    .map_err(|e| Error::Internal(format!("Invalid redirect URI: {}", e)))?,
            );

        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let default_scopes = if config.scopes.is_empty() {
            vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ]
        } else {
            config.scopes.clone()
        };

        let mut authorization_params = BTreeMap::from([
            ("prompt".to_string(), "consent".to_string()),
            ("access_type".to_string(), "offline".to_string()),
        ]);
        authorization_params.extend(config.authorization_params.clone());

        Ok(Self {
            client,
            http_client,
            default_scopes,
            authorization_params,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorization_url(&self, state: &str, additional_scopes: &[String]) -> String {
        let mut all_scopes: Vec<Scope> = self
            .default_scopes
            .iter()
            .map(|s| Scope::new(s.clone()))
            .collect();

        for scope in additional_scopes {
            if !self.default_scopes.contains(scope) {
                all_scopes.push(Scope::new(scope.clone()));
            }
        }

        let mut auth_request = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()));

        for scope in all_scopes {
            auth_request = auth_request.add_scope(scope);
        }

        for (name, value) in &self.authorization_params {
            auth_request = auth_request.add_extra_param(name.as_str(), value.as_str());
        }

        let (url, _) = auth_request.url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, Error> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| Error::External(format!("Google token exchange failed: {}", e)))?;

        Ok(OAuthTokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_result.expires_in().map(|d| d.as_secs() as i64),
            token_type: "Bearer".to_string(),
        })
    }

    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, Error> {
        let response = self
            .http_client
            .get("https://www.googleapis.com/oauth2/v3/userinfo")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::External(format!("Failed to fetch Google user info: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "Google user info request failed: {} - {}",
                status, body
            )));
        }

        let user_info: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Failed to parse Google user info: {}", e)))?;

        parse_user_info(user_info)
    }
}

/// Map a v3 userinfo response to normalized user info
fn parse_user_info(user_info: serde_json::Value) -> Result<OAuthUserInfo, Error> {
    Ok(OAuthUserInfo {
        provider: Provider::Google,
        provider_user_id: user_info["sub"]
            .as_str()
            .ok_or_else(|| Error::MalformedProfile("Missing sub in Google response".to_string()))?
            .to_string(),
        email: user_info["email"].as_str().map(|s| s.to_string()),
        email_verified: user_info["email_verified"].as_bool().unwrap_or(false),
        name: user_info["name"].as_str().map(|s| s.to_string()),
        login: None,
        picture: user_info["picture"].as_str().map(|s| s.to_string()),
        raw: user_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> OAuthProviderConfig {
        OAuthProviderConfig::new("test-client-id", "test-secret")
    }

    #[test]
    fn test_authorization_url_requests_consent_and_offline_access() {
        let provider = GoogleProvider::new(&config(), "https://example.com/callback").unwrap();
        let url = provider.authorization_url("test-state", &[]);

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("state=test-state"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("redirect_uri="));
    }

    #[test]
    fn test_configured_params_override_defaults() {
        let mut config = config();
        config
            .authorization_params
            .insert("prompt".to_string(), "select_account".to_string());
        let provider = GoogleProvider::new(&config, "https://example.com/callback").unwrap();
        let url = provider.authorization_url("s", &[]);

        assert!(url.contains("prompt=select_account"));
        assert!(!url.contains("prompt=consent"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_additional_scopes() {
        let mut config = config();
        config.scopes = vec!["openid".to_string()];
        let provider = GoogleProvider::new(&config, "https://example.com/callback").unwrap();
        let url = provider.authorization_url("test-state", &["calendar".to_string()]);

        assert!(url.contains("openid"));
        assert!(url.contains("calendar"));
    }

    #[test]
    fn test_parse_user_info() {
        let raw = json!({
            "sub": "109876543210",
            "email": "Ada@X.com",
            "email_verified": true,
            "name": "Ada Lovelace",
            "picture": "https://lh3.googleusercontent.com/a/ada"
        });

        let info = parse_user_info(raw).unwrap();
        assert_eq!(info.provider, Provider::Google);
        assert_eq!(info.provider_user_id, "109876543210");
        assert_eq!(info.email.as_deref(), Some("Ada@X.com"));
        assert!(info.email_verified);
        assert!(info.login.is_none());
    }

    #[test]
    fn test_unverified_google_email_is_refused() {
        let info = parse_user_info(json!({
            "sub": "109876543210",
            "email": "ada@x.com",
            "name": "Ada Lovelace"
        }))
        .unwrap();
        assert!(!info.email_verified);

        assert!(matches!(
            crate::users::Profile::try_from(info),
            Err(Error::MalformedProfile(_))
        ));
    }

    #[test]
    fn test_parse_user_info_requires_sub() {
        assert!(matches!(
            parse_user_info(json!({ "email": "a@x.com" })),
            Err(Error::MalformedProfile(_))
        ));
    }
}
