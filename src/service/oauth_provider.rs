use crate::common::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::service::oauth_bridge::VerifiedOAuthIdentity;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenResponse, TokenUrl};
use std::collections::HashMap;

/// Wraps one `oauth2` client per configured provider plus the user-info
/// endpoint needed to turn an access token into an identity. `oauth2`
/// itself only gets a caller to a token endpoint as far as a token; the
/// provider-specific profile shape is this crate's problem, same as any
/// OAuth consumer's.
pub struct OAuthProviderRegistry {
    clients: HashMap<String, BasicClient>,
    user_info_urls: HashMap<String, String>,
    http: reqwest::Client,
}

impl OAuthProviderRegistry {
    /// Builds a client per configured provider, skipping (and logging) any
    /// provider whose URLs don't parse rather than failing construction
    /// for the whole registry — one malformed provider disables just that
    /// provider's endpoints (`is_configured`/`authorize_url` then report
    /// `NotConfigured` for it), the same best-effort stance `WebAuthnCore`
    /// takes toward its own config.
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let mut clients = HashMap::new();
        let mut user_info_urls = HashMap::new();

        for (name, provider) in &config.providers {
            match Self::build_client(provider) {
                Ok(client) => {
                    clients.insert(name.clone(), client);
                    user_info_urls.insert(name.clone(), provider.user_info_url.clone());
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "skipping misconfigured OAuth provider");
                }
            }
        }

        Ok(Self {
            clients,
            user_info_urls,
            http: reqwest::Client::new(),
        })
    }

    fn build_client(provider: &crate::common::config::OAuthProviderConfig) -> Result<BasicClient> {
        let auth_url = AuthUrl::new(provider.auth_url.clone())
            .map_err(|e| Error::Internal(format!("invalid auth_url: {}", e)))?;
        let token_url = TokenUrl::new(provider.token_url.clone())
            .map_err(|e| Error::Internal(format!("invalid token_url: {}", e)))?;
        let redirect_url = RedirectUrl::new(provider.redirect_url.clone())
            .map_err(|e| Error::Internal(format!("invalid redirect_url: {}", e)))?;

        Ok(BasicClient::new(
            ClientId::new(provider.client_id.clone()),
            Some(ClientSecret::new(provider.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url))
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        self.clients.contains_key(provider)
    }

    fn client(&self, provider: &str) -> Result<&BasicClient> {
        self.clients
            .get(provider)
            .ok_or_else(|| Error::NotConfigured(format!("OAuth provider '{}' is not configured", provider)))
    }

    /// Builds the provider's authorization URL and the CSRF token the
    /// caller must persist and check again at exchange time.
    pub fn authorize_url(&self, provider: &str) -> Result<(String, String)> {
        let (auth_url, csrf_token) = self
            .client(provider)?
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();

        Ok((auth_url.to_string(), csrf_token.secret().clone()))
    }

    /// Exchanges an authorization code for an access token and fetches the
    /// provider's user-info endpoint, normalizing the response into a
    /// `VerifiedOAuthIdentity`.
    pub async fn exchange_and_identify(&self, provider: &str, code: &str) -> Result<VerifiedOAuthIdentity> {
        let client = self.client(provider)?;

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| Error::Unauthorized(format!("OAuth code exchange failed: {}", e)))?;

        let user_info_url = self
            .user_info_urls
            .get(provider)
            .expect("client() above already validated the provider exists");

        let response = self
            .http
            .get(user_info_url)
            .bearer_auth(token.access_token().secret())
            .header("User-Agent", "ward-api")
            .send()
            .await
            .map_err(|e| Error::Internal(format!("failed to fetch OAuth user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Unauthorized(
                "OAuth provider rejected the user-info request".to_string(),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("failed to parse OAuth user info: {}", e)))?;

        parse_identity(provider, &body)
    }
}

/// Normalizes a provider's profile JSON into the shared identity shape.
/// Github puts the numeric id under `id` and the handle under `login`;
/// Google puts a string subject under `sub` and the handle under `email`'s
/// local part, falling back to `name`. Both put the display name under
/// `name`.
fn parse_identity(provider: &str, body: &serde_json::Value) -> Result<VerifiedOAuthIdentity> {
    let email = body
        .get("email")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Unauthorized("OAuth provider did not return an email address".to_string()))?
        .to_string();

    let external_id = body
        .get("id")
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .or_else(|| body.get("sub").and_then(|v| v.as_str()).map(|s| s.to_string()))
        .unwrap_or_default();

    let login = body
        .get("login")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

    let display_name = body
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| login.clone());

    Ok(VerifiedOAuthIdentity {
        provider: provider.to_string(),
        external_id,
        login,
        email,
        display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_style_identity() {
        let body = serde_json::json!({
            "id": 12345,
            "login": "octocat",
            "email": "octocat@example.com",
            "name": "The Octocat"
        });
        let identity = parse_identity("github", &body).unwrap();
        assert_eq!(identity.external_id, "12345");
        assert_eq!(identity.login, "octocat");
        assert_eq!(identity.email, "octocat@example.com");
        assert_eq!(identity.display_name, "The Octocat");
    }

    #[test]
    fn test_parse_google_style_identity_falls_back_to_email_local_part() {
        let body = serde_json::json!({
            "sub": "109876543210",
            "email": "alice@example.com",
            "name": "Alice Example"
        });
        let identity = parse_identity("google", &body).unwrap();
        assert_eq!(identity.external_id, "109876543210");
        assert_eq!(identity.login, "alice");
        assert_eq!(identity.display_name, "Alice Example");
    }

    #[test]
    fn test_parse_identity_without_email_fails() {
        let body = serde_json::json!({ "id": 1, "login": "nobody" });
        assert!(parse_identity("github", &body).is_err());
    }

    #[test]
    fn test_unconfigured_provider_errors() {
        let registry = OAuthProviderRegistry::new(&OAuthConfig::default()).unwrap();
        assert!(!registry.is_configured("github"));
        assert!(registry.authorize_url("github").is_err());
    }

    #[test]
    fn test_malformed_provider_is_skipped_not_fatal() {
        let mut providers = HashMap::new();
        providers.insert(
            "broken".to_string(),
            crate::common::config::OAuthProviderConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                auth_url: "not a url".to_string(),
                token_url: "https://example.com/token".to_string(),
                redirect_url: "https://example.com/callback".to_string(),
                user_info_url: "https://example.com/userinfo".to_string(),
            },
        );
        providers.insert(
            "github".to_string(),
            crate::common::config::OAuthProviderConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                auth_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                redirect_url: "https://example.com/callback".to_string(),
                user_info_url: "https://api.github.com/user".to_string(),
            },
        );

        let registry = OAuthProviderRegistry::new(&OAuthConfig { providers }).unwrap();
        assert!(!registry.is_configured("broken"));
        assert!(registry.is_configured("github"));
    }
}
