//! Integration tests for the authentication core.
//!
//! These exercise `AuthenticationService` end to end against a real
//! Postgres instance via testcontainers, the same way the teacher's
//! integration suite exercised its HTTP handlers against a live database.

mod common;

use common::fixtures::UserFixture;
use common::TestDb;
use std::sync::Arc;
use ward::common::config::{LockoutConfig, TokenConfig, TotpConfig, WebAuthnConfig};
use ward::service::auth_service::CreateUserInput;
use ward::service::{
    AuthenticationService, LockoutAccountant, MasterKeyCoordinator, OAuthBridge, SessionManager,
    TwoFactorCore, VerificationTokenService, WebAuthnCore,
};
use ward::storage::postgres::{
    PgCredentialSetStore, PgLoginAttemptStore, PgMasterKeyStore, PgSessionStore,
    PgSingleUseTokenStore, PgTwoFactorStore, PgUserStore,
};
use ward::storage::UserStore;
use ward::{Database, Error, EncryptionManager, JwtManager};

const TEST_JWT_SECRET: &str = "integration_test_jwt_secret_value_32";

fn build_service(db: &Database, lockout_limit: u32) -> AuthenticationService {
    let pool = db.pool.clone();
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let sessions_store = Arc::new(PgSessionStore::new(pool.clone()));
    let login_attempts = Arc::new(PgLoginAttemptStore::new(pool.clone()));
    let master_keys_store = Arc::new(PgMasterKeyStore::new(pool.clone()));
    let two_factor_store = Arc::new(PgTwoFactorStore::new(pool.clone()));
    let credential_sets = Arc::new(PgCredentialSetStore::new(pool.clone()));
    let single_use_tokens = Arc::new(PgSingleUseTokenStore::new(pool));

    let jwt = Arc::new(JwtManager::new(TEST_JWT_SECRET.to_string(), 15, 24));

    let lockout = LockoutAccountant::new(
        login_attempts,
        LockoutConfig {
            failed_attempt_limit: lockout_limit,
            window_secs: 900,
        },
    );
    let sessions = SessionManager::new(sessions_store, users.clone(), jwt);
    let master_keys = MasterKeyCoordinator::new(master_keys_store);
    let oauth = OAuthBridge::new(users.clone());
    let tokens = VerificationTokenService::new(single_use_tokens, TokenConfig::default());
    let two_factor = TwoFactorCore::new(two_factor_store, EncryptionManager::new(), TotpConfig::default());

    let webauthn_config = WebAuthnConfig {
        rp_id: "localhost".to_string(),
        rp_origin: "http://localhost:8080".to_string(),
        rp_name: "Ward Test".to_string(),
    };
    let ceremonies = Arc::new(ward::storage::memory::InMemoryCeremonyStore::default());
    let webauthn = WebAuthnCore::new(&webauthn_config, credential_sets, ceremonies, users.clone())
        .expect("localhost webauthn config is always valid");

    AuthenticationService::new(
        users,
        lockout,
        sessions,
        master_keys,
        oauth,
        tokens,
        two_factor,
        Some(webauthn),
        TokenConfig::default(),
    )
}

#[tokio::test]
async fn signup_then_login_succeeds() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let created = service
        .create_user(CreateUserInput {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Str0ngPassw0rd".to_string(),
            role: "user".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(created.username, "alice");
    assert!(created.password_hash.is_empty(), "returned user must not leak its hash");

    let login = service
        .login("alice", "Str0ngPassw0rd", "127.0.0.1", None)
        .await
        .unwrap();
    assert_eq!(login.user.username, "alice");
    assert!(!login.access_token.is_empty());
    assert!(!login.refresh_token.is_empty());
}

#[tokio::test]
async fn duplicate_username_signup_conflicts() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    UserFixture::create_with_username(&test_db.db, "bob").await;

    let result = service
        .create_user(CreateUserInput {
            username: "bob".to_string(),
            email: "bob-two@example.com".to_string(),
            password: "Str0ngPassw0rd".to_string(),
            role: "user".to_string(),
        })
        .await;

    assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn login_with_wrong_password_fails() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    UserFixture::create_with(&test_db.db, "carol", "carol@example.com", "CorrectHorse1", "user").await;

    let result = service.login("carol", "WrongPassword1", "127.0.0.1", None).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn login_with_unknown_username_fails_the_same_way_as_wrong_password() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let result = service.login("nobody", "whatever1A", "127.0.0.1", None).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn account_locks_out_after_repeated_failures() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 3);

    UserFixture::create_with(&test_db.db, "dana", "dana@example.com", "CorrectHorse1", "user").await;

    for _ in 0..3 {
        let _ = service.login("dana", "WrongPassword1", "127.0.0.1", None).await;
    }

    let result = service.login("dana", "CorrectHorse1", "127.0.0.1", None).await;
    assert!(matches!(result, Err(Error::LockedOut(_))));
}

#[tokio::test]
async fn refresh_token_issues_a_fresh_pair() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    UserFixture::create_with(&test_db.db, "erin", "erin@example.com", "CorrectHorse1", "user").await;

    let first = service
        .login("erin", "CorrectHorse1", "127.0.0.1", None)
        .await
        .unwrap();

    let refreshed = service.refresh(&first.refresh_token).await.unwrap();
    assert_eq!(refreshed.user.username, "erin");
    assert_ne!(refreshed.access_token, first.access_token);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    UserFixture::create_with(&test_db.db, "frank", "frank@example.com", "CorrectHorse1", "user").await;

    let login = service
        .login("frank", "CorrectHorse1", "127.0.0.1", None)
        .await
        .unwrap();

    service.logout(&login.access_token).await.unwrap();
    assert!(service.verify_access_token(&login.access_token).await.is_err());
}

#[tokio::test]
async fn change_password_revokes_other_sessions() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let user = UserFixture::create_with(&test_db.db, "grace", "grace@example.com", "CorrectHorse1", "user").await;

    let first_login = service
        .login("grace", "CorrectHorse1", "127.0.0.1", None)
        .await
        .unwrap();

    service
        .change_password(user.id, "CorrectHorse1", "NewCorrectHorse2")
        .await
        .unwrap();

    assert!(service.verify_access_token(&first_login.access_token).await.is_err());

    let relogged_in = service
        .login("grace", "NewCorrectHorse2", "127.0.0.1", None)
        .await
        .unwrap();
    assert_eq!(relogged_in.user.username, "grace");
}

#[tokio::test]
async fn password_reset_flow_round_trips() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    UserFixture::create_with(&test_db.db, "heidi", "heidi@example.com", "CorrectHorse1", "user").await;

    let token = service
        .request_password_reset("heidi@example.com")
        .await
        .unwrap()
        .expect("known email must issue a reset token");

    service.reset_password(&token, "BrandNewPassw0rd").await.unwrap();

    assert!(service
        .login("heidi", "CorrectHorse1", "127.0.0.1", None)
        .await
        .is_err());
    assert!(service
        .login("heidi", "BrandNewPassw0rd", "127.0.0.1", None)
        .await
        .is_ok());
}

#[tokio::test]
async fn password_reset_for_unknown_email_is_silent() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let result = service.request_password_reset("ghost@example.com").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn email_verification_flow_sets_metadata() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let user = UserFixture::create_with(&test_db.db, "ivan", "ivan@example.com", "CorrectHorse1", "user").await;
    assert!(!user.email_verified());

    let token = service.request_verification_email(user.id).await.unwrap();
    service.verify_email(&token).await.unwrap();

    let store = PgUserStore::new(test_db.db.pool.clone());
    let reloaded = store.get_by_id(user.id).await.unwrap().unwrap();
    assert!(reloaded.email_verified());
}

#[tokio::test]
async fn two_factor_enrollment_and_verification_round_trip() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let user = UserFixture::create_with(&test_db.db, "judy", "judy@example.com", "CorrectHorse1", "user").await;

    let enrollment = service.two_factor().enable(user.id, &user.username).await.unwrap();
    assert!(!enrollment.backup_codes.is_empty());
    assert!(!enrollment.secret.is_empty());

    // The enrollment isn't active until the caller proves possession of the
    // secret by submitting a valid code, which this test can't do without
    // computing a live TOTP; it only asserts the pending-state invariant.
    let status = service.two_factor().status(user.id).await.unwrap().unwrap();
    assert!(!status.enabled);
    assert_eq!(status.remaining_backup_codes, enrollment.backup_codes.len());
}

#[tokio::test]
async fn oauth_login_provisions_a_new_user_from_a_verified_identity() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let identity = ward::service::VerifiedOAuthIdentity {
        provider: "github".to_string(),
        external_id: "12345".to_string(),
        login: "octocat".to_string(),
        email: "octocat@example.com".to_string(),
        display_name: "The Octocat".to_string(),
    };

    let login = service
        .login_with_oauth(&identity, "127.0.0.1", None)
        .await
        .unwrap();
    assert_eq!(login.user.email, "octocat@example.com");

    // Logging in again with the same identity resolves to the same user
    // rather than provisioning a second one.
    let second_login = service
        .login_with_oauth(&identity, "127.0.0.1", None)
        .await
        .unwrap();
    assert_eq!(second_login.user.id, login.user.id);
}

#[tokio::test]
async fn disabled_account_cannot_log_in() {
    let test_db = TestDb::new().await;
    test_db.clean().await;
    let service = build_service(&test_db.db, 5);

    let user = UserFixture::create_with(&test_db.db, "kim", "kim@example.com", "CorrectHorse1", "user").await;
    sqlx::query("UPDATE users SET active = false WHERE id = $1")
        .bind(user.id)
        .execute(&test_db.db.pool)
        .await
        .unwrap();

    let result = service.login("kim", "CorrectHorse1", "127.0.0.1", None).await;
    assert!(matches!(result, Err(Error::Disabled(_))));
}
