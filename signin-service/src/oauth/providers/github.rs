//! GitHub OAuth provider implementation

use async_trait::async_trait;
use oauth2::{
    basic::BasicErrorResponse, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret,
    CsrfToken, EmptyExtraTokenFields, RedirectUrl, Scope, StandardRevocableToken,
    StandardTokenIntrospectionResponse, StandardTokenResponse, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use std::collections::BTreeMap;

use crate::config::OAuthProviderConfig;
use crate::error::Error;
use crate::oauth::{OAuthProvider, OAuthTokens, OAuthUserInfo};
use crate::users::Provider;

/// Type alias for our configured OAuth client
pub(crate) type ConfiguredClient = Client<
    BasicErrorResponse,
    StandardTokenResponse<EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    StandardRevocableToken,
    BasicErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// GitHub OAuth provider
#[derive(Clone)]
pub struct GitHubProvider {
    client: ConfiguredClient,
    http_client: HttpClient,
    default_scopes: Vec<String>,
    authorization_params: BTreeMap<String, String>,
}

impl GitHubProvider {
    /// Create a new GitHub OAuth provider from configuration
    pub fn new(config: &OAuthProviderConfig, redirect_uri: &str) -> Result<Self, Error> {
        let client = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new("https://github.com/login/oauth/authorize".to_string())
                    .map_err(|e| Error::Internal(format!("Invalid GitHub auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new("https://github.com/login/oauth/access_token".to_string())
                    .map_err(|e| Error::Internal(format!("Invalid GitHub token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string())
                    .map_err(|e| Error::Internal(format!("Invalid redirect URI: {}", e)))?,
            );

        // GitHub rejects API calls without a User-Agent
        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("signin-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let default_scopes = if config.scopes.is_empty() {
            vec!["read:user".to_string(), "user:email".to_string()]
        } else {
            config.scopes.clone()
        };

        Ok(Self {
            client,
            http_client,
            default_scopes,
            authorization_params: config.authorization_params.clone(),
        })
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn provider(&self) -> Provider {
        Provider::GitHub
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
            .map_err(|e| Error::External(format!("GitHub token exchange failed: {}", e)))?;

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
            .get("https://api.github.com/user")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::External(format!("Failed to fetch GitHub user info: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "GitHub user info request failed: {} - {}",
                status, body
            )));
        }

        let user_info: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Failed to parse GitHub user info: {}", e)))?;

        // /user omits private emails; /user/emails lists them
        let email = match user_info["email"].as_str() {
            Some(email) => Some(email.to_string()),
            None => self.get_primary_email(access_token).await.ok(),
        };

        parse_user_info(user_info, email)
    }
}

impl GitHubProvider {
    /// Get the primary verified email from GitHub
    async fn get_primary_email(&self, access_token: &str) -> Result<String, Error> {
        let response = self
            .http_client
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::External(format!("Failed to fetch GitHub emails: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::External("Failed to fetch GitHub emails".to_string()));
        }

        let emails: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Failed to parse GitHub emails: {}", e)))?;

        select_email(&emails).ok_or_else(|| Error::External("No verified email found".to_string()))
    }
}

/// Map a `/user` response to normalized user info
fn parse_user_info(
    user_info: serde_json::Value,
    email: Option<String>,
) -> Result<OAuthUserInfo, Error> {
    let provider_user_id = user_info["id"]
        .as_i64()
        .ok_or_else(|| Error::MalformedProfile("Missing id in GitHub response".to_string()))?
        .to_string();

    let login = user_info["login"].as_str().map(|s| s.to_string());

    Ok(OAuthUserInfo {
        provider: Provider::GitHub,
        provider_user_id,
        email,
        email_verified: true,
        name: user_info["name"]
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| login.clone()),
        login,
        picture: user_info["avatar_url"].as_str().map(|s| s.to_string()),
        raw: user_info,
    })
}

/// Primary verified email, else any verified email
fn select_email(emails: &[serde_json::Value]) -> Option<String> {
    let verified = |email: &&serde_json::Value| email["verified"].as_bool().unwrap_or(false);

    emails
        .iter()
        .filter(verified)
        .find(|email| email["primary"].as_bool().unwrap_or(false))
        .or_else(|| emails.iter().find(verified))
        .and_then(|email| email["email"].as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> OAuthProviderConfig {
        OAuthProviderConfig::new("test-client-id", "test-secret")
    }

    #[test]
    fn test_authorization_url_generation() {
        let provider = GitHubProvider::new(&config(), "https://example.com/callback").unwrap();
        let url = provider.authorization_url("test-state", &[]);

        assert!(url.starts_with("https://github.com/login/oauth/authorize"));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("state=test-state"));
        assert!(url.contains("read%3Auser"));
    }

    #[test]
    fn test_configured_scopes_replace_defaults() {
        let mut config = config();
        config.scopes = vec!["read:user".to_string()];
        let provider = GitHubProvider::new(&config, "https://example.com/callback").unwrap();
        let url = provider.authorization_url("s", &[]);

        assert!(url.contains("read%3Auser"));
        assert!(!url.contains("user%3Aemail"));
    }

    #[test]
    fn test_invalid_redirect_uri_is_rejected() {
        assert!(matches!(
            GitHubProvider::new(&config(), "not a url"),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_parse_user_info() {
        let raw = json!({
            "id": 42,
            "login": "ada",
            "name": null,
            "avatar_url": "https://avatars.githubusercontent.com/u/42"
        });

        let info = parse_user_info(raw, Some("a@x.com".to_string())).unwrap();
        assert_eq!(info.provider, Provider::GitHub);
        assert_eq!(info.provider_user_id, "42");
        assert_eq!(info.name.as_deref(), Some("ada"));
        assert_eq!(info.login.as_deref(), Some("ada"));
        assert_eq!(
            info.picture.as_deref(),
            Some("https://avatars.githubusercontent.com/u/42")
        );
    }

    #[test]
    fn test_parse_user_info_requires_id() {
        let raw = json!({ "login": "ada" });
        assert!(parse_user_info(raw, None).is_err());
    }

    #[test]
    fn test_select_email_prefers_primary_verified() {
        let emails = vec![
            json!({ "email": "old@x.com", "verified": true, "primary": false }),
            json!({ "email": "unverified@x.com", "verified": false, "primary": true }),
            json!({ "email": "main@x.com", "verified": true, "primary": true }),
        ];
        assert_eq!(select_email(&emails).as_deref(), Some("main@x.com"));

        let no_primary = vec![
            json!({ "email": "unverified@x.com", "verified": false, "primary": true }),
            json!({ "email": "old@x.com", "verified": true, "primary": false }),
        ];
        assert_eq!(select_email(&no_primary).as_deref(), Some("old@x.com"));

        assert_eq!(select_email(&[]), None);
    }
}
