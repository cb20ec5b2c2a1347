mod credential_set_store;
mod credential_store;
mod login_attempt_store;
mod master_key_store;
mod session_store;
mod single_use_token_store;
mod two_factor_store;
mod user_store;

pub use credential_set_store::PgCredentialSetStore;
pub use credential_store::PgCredentialStore;
pub use login_attempt_store::PgLoginAttemptStore;
pub use master_key_store::PgMasterKeyStore;
pub use session_store::PgSessionStore;
pub use single_use_token_store::PgSingleUseTokenStore;
pub use two_factor_store::PgTwoFactorStore;
pub use user_store::PgUserStore;
