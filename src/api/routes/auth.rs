use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use ward::models::{AuthResponse, CreateUserRequest, LoginRequest, RefreshTokenRequest, UserResponse};
use ward::service::auth_service::CreateUserInput;
use ward::storage::CeremonyStore;
use ward::validation::validate_request;
use ward::Error;

use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Signup and login see the brunt of credential-stuffing traffic, so the
    // whole auth scope runs behind its own, stricter limiter in addition to
    // the app-wide one in main.rs.
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_second(2)
        .burst_size(10)
        .finish()
        .expect("static governor config is always valid");

    cfg.service(
        web::scope("/auth")
            .wrap(Governor::new(&governor_conf))
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/oauth/initiate", web::post().to(oauth_initiate))
            .route("/oauth/callback", web::get().to(oauth_callback))
            .route("/oauth/exchange", web::post().to(oauth_exchange))
            .route("/webauthn/register/begin", web::post().to(webauthn_register_begin))
            .route("/webauthn/register/finish", web::post().to(webauthn_register_finish))
            .route("/webauthn/login/begin", web::post().to(webauthn_login_begin))
            .route("/webauthn/login/finish", web::post().to(webauthn_login_finish))
            .route("/webauthn/available", web::get().to(webauthn_available)),
    );
}

/// First value of `X-Forwarded-For`, else `X-Real-IP`, else the connection's
/// remote address.
fn extract_client_ip(req: &HttpRequest) -> String {
    if let Some(value) = req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = value.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    if let Some(value) = req.headers().get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

async fn signup(
    state: web::Data<Arc<AppState>>,
    req: HttpRequest,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, Error> {
    validate_request(&body)?;

    let ip = extract_client_ip(&req);
    let user_agent = extract_user_agent(&req);

    let user = state
        .auth
        .create_user(CreateUserInput {
            username: body.username.clone(),
            email: body.email.clone(),
            password: body.password.clone(),
            role: body.role.clone(),
        })
        .await?;

    match state.auth.login(&body.username, &body.password, &ip, user_agent).await {
        Ok(result) => Ok(HttpResponse::Created().json(AuthResponse {
            user: result.user.into(),
            token: result.access_token,
            refresh_token: result.refresh_token,
            expires_at: result.expires_at,
        })),
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "auto-login after signup failed");
            Ok(HttpResponse::Created().json(serde_json::json!({ "user": UserResponse::from(user) })))
        }
    }
}

async fn login(
    state: web::Data<Arc<AppState>>,
    req: HttpRequest,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    validate_request(&body)?;

    let ip = extract_client_ip(&req);
    let user_agent = extract_user_agent(&req);

    let result = state.auth.login(&body.username, &body.password, &ip, user_agent).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: result.user.into(),
        token: result.access_token,
        refresh_token: result.refresh_token,
        expires_at: result.expires_at,
    }))
}

async fn refresh(
    state: web::Data<Arc<AppState>>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, Error> {
    let result = state.auth.refresh(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: result.user.into(),
        token: result.access_token,
        refresh_token: result.refresh_token,
        expires_at: result.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
struct OAuthInitiateRequest {
    provider: String,
    #[serde(default)]
    #[allow(dead_code)]
    platform: Option<String>,
}

async fn oauth_initiate(
    state: web::Data<Arc<AppState>>,
    body: web::Json<OAuthInitiateRequest>,
) -> Result<HttpResponse, Error> {
    if !matches!(body.provider.as_str(), "github" | "google") {
        return Err(Error::BadRequest(format!("unknown OAuth provider '{}'", body.provider)));
    }

    let (auth_url, csrf_state) = state.oauth_providers.authorize_url(&body.provider)?;

    state
        .oauth_state
        .put(&ward::cache::keys::oauth_state(&csrf_state), &body.provider)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "auth_url": auth_url,
        "state": csrf_state,
        "provider": body.provider,
    })))
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// The provider redirects the browser here after the user approves or
/// denies access. This isn't the token exchange — it relays the
/// authorization code and state back to the client app: a `postMessage` to
/// the window that opened the popup, falling back to a plain redirect with
/// the code/state as query params for flows that navigated the top-level
/// window instead of opening a popup.
async fn oauth_callback(query: web::Query<OAuthCallbackQuery>) -> Result<HttpResponse, Error> {
    if query.code.is_none() && query.error.is_none() {
        return Err(Error::BadRequest("missing code or error in OAuth callback".to_string()));
    }

    let payload = serde_json::json!({
        "code": query.code,
        "state": query.state,
        "error": query.error,
    });

    let redirect_code = query.code.clone().unwrap_or_default();
    let redirect_state = query.state.clone().unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Signing in...</title></head>
<body>
<script>
  (function () {{
    var payload = {payload};
    if (window.opener) {{
      window.opener.postMessage({{ type: "oauth-callback", payload: payload }}, "*");
      window.close();
    }} else {{
      window.location.replace(
        "/?oauth_code=" + encodeURIComponent("{redirect_code}") +
        "&oauth_state=" + encodeURIComponent("{redirect_state}")
      );
    }}
  }})();
</script>
<p>You can close this window.</p>
</body>
</html>"#,
        payload = payload,
        redirect_code = redirect_code,
        redirect_state = redirect_state,
    );

    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(html))
}

#[derive(Debug, Deserialize)]
struct OAuthExchangeRequest {
    provider: String,
    code: String,
    state: String,
}

async fn oauth_exchange(
    state: web::Data<Arc<AppState>>,
    req: HttpRequest,
    body: web::Json<OAuthExchangeRequest>,
) -> Result<HttpResponse, Error> {
    let stored_provider = state
        .oauth_state
        .take(&ward::cache::keys::oauth_state(&body.state))
        .await?
        .ok_or_else(|| Error::BadRequest("unknown or expired OAuth state".to_string()))?;

    if stored_provider != body.provider {
        return Err(Error::BadRequest("OAuth state does not match provider".to_string()));
    }

    let identity = state.oauth_providers.exchange_and_identify(&body.provider, &body.code).await?;

    let ip = extract_client_ip(&req);
    let user_agent = extract_user_agent(&req);
    let result = state.auth.login_with_oauth(&identity, &ip, user_agent).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: result.user.into(),
        token: result.access_token,
        refresh_token: result.refresh_token,
        expires_at: result.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
struct WebAuthnRegisterBeginRequest {
    user_id: Uuid,
    username: String,
}

async fn webauthn_register_begin(
    state: web::Data<Arc<AppState>>,
    body: web::Json<WebAuthnRegisterBeginRequest>,
) -> Result<HttpResponse, Error> {
    let challenge_json = state
        .auth
        .webauthn()?
        .begin_registration(body.user_id, &body.username, &body.username)
        .await?;

    let options: serde_json::Value = serde_json::from_str(&challenge_json)
        .map_err(|e| Error::Internal(format!("failed to parse registration challenge: {}", e)))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "options": options })))
}

#[derive(Debug, Deserialize)]
struct WebAuthnRegisterFinishRequest {
    user_id: Uuid,
    credential: serde_json::Value,
}

async fn webauthn_register_finish(
    state: web::Data<Arc<AppState>>,
    body: web::Json<WebAuthnRegisterFinishRequest>,
) -> Result<HttpResponse, Error> {
    let response_json = serde_json::to_string(&body.credential)
        .map_err(|e| Error::BadRequest(format!("invalid credential payload: {}", e)))?;

    state.auth.webauthn()?.finish_registration(body.user_id, &response_json).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct WebAuthnLoginBeginRequest {
    user_id: Uuid,
}

async fn webauthn_login_begin(
    state: web::Data<Arc<AppState>>,
    body: web::Json<WebAuthnLoginBeginRequest>,
) -> Result<HttpResponse, Error> {
    let challenge_json = state.auth.webauthn()?.begin_authentication_for_user(body.user_id).await?;

    let options: serde_json::Value = serde_json::from_str(&challenge_json)
        .map_err(|e| Error::Internal(format!("failed to parse authentication challenge: {}", e)))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "options": options })))
}

#[derive(Debug, Deserialize)]
struct WebAuthnLoginFinishRequest {
    user_id: Uuid,
    assertion: serde_json::Value,
}

async fn webauthn_login_finish(
    state: web::Data<Arc<AppState>>,
    req: HttpRequest,
    body: web::Json<WebAuthnLoginFinishRequest>,
) -> Result<HttpResponse, Error> {
    let response_json = serde_json::to_string(&body.assertion)
        .map_err(|e| Error::BadRequest(format!("invalid assertion payload: {}", e)))?;

    let user_id = state
        .auth
        .webauthn()?
        .finish_authentication_for_user(body.user_id, &response_json)
        .await?;

    let ip = extract_client_ip(&req);
    let user_agent = extract_user_agent(&req);
    let result = state.auth.login_with_webauthn(user_id, &ip, user_agent).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        user: result.user.into(),
        token: result.access_token,
        refresh_token: result.refresh_token,
        expires_at: result.expires_at,
    }))
}

async fn webauthn_available(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "available": state.auth.webauthn().is_ok() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extract_client_ip_prefers_forwarded_for() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.5, 10.0.0.1"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req), "203.0.113.5");
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_real_ip() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "198.51.100.7"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req), "198.51.100.7");
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_unknown_without_headers_or_peer() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(extract_client_ip(&req), "unknown");
    }
}
