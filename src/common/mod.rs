pub mod cache;
pub mod config;
pub mod db;
pub mod encryption;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod models;
pub mod secrets;
pub mod tracing;
pub mod validation;

pub use cache::{CacheManager, CacheStats};
pub use config::{Config, init_tracing, load_env};
pub use db::{Database, DatabaseConfig, PoolStats};
pub use encryption::EncryptionManager;
pub use error::{Error, Result};
pub use jwt::{Claims, JwtManager, TokenType};
pub use metrics::Metrics;
pub use secrets::{SecretSource, SecretsManager};
pub use validation::{validate_password_strength, validate_request};
