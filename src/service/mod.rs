/// The authentication core. Each submodule is one component from the
/// design's leaf-first decomposition; `auth_service` composes all of them
/// behind the single façade HTTP handlers talk to.
pub mod auth_service;
pub mod lockout;
pub mod master_key;
pub mod oauth_bridge;
pub mod oauth_provider;
pub mod password_manager;
pub mod session_manager;
pub mod two_factor;
pub mod verification_tokens;
pub mod webauthn;

pub use auth_service::AuthenticationService;
pub use lockout::LockoutAccountant;
pub use master_key::MasterKeyCoordinator;
pub use oauth_bridge::{OAuthBridge, VerifiedOAuthIdentity};
pub use oauth_provider::OAuthProviderRegistry;
pub use password_manager::PasswordManager;
pub use session_manager::SessionManager;
pub use two_factor::TwoFactorCore;
pub use verification_tokens::VerificationTokenService;
pub use webauthn::WebAuthnCore;
