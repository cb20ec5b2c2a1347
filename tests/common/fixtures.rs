//! Test fixtures for generating test data

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use fake::{Fake, faker::internet::en::SafeEmail, faker::name::en::Name};
use std::collections::HashMap;
use uuid::Uuid;
use ward::models::User;
use ward::storage::postgres::PgUserStore;
use ward::storage::UserStore;
use ward::Database;

/// Helper to hash a password for tests
pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

/// Fixture for creating test users directly against the database.
pub struct UserFixture;

impl UserFixture {
    pub async fn create(db: &Database) -> User {
        let username: String = Name().fake::<String>().replace(' ', "").to_lowercase();
        let email: String = SafeEmail().fake();
        Self::create_with(db, &username, &email, "testpassword123", "user").await
    }

    pub async fn create_admin(db: &Database) -> User {
        let username: String = Name().fake::<String>().replace(' ', "").to_lowercase();
        let email: String = SafeEmail().fake();
        Self::create_with(db, &username, &email, "testpassword123", "admin").await
    }

    pub async fn create_with_username(db: &Database, username: &str) -> User {
        let email: String = SafeEmail().fake();
        Self::create_with(db, username, &email, "testpassword123", "user").await
    }

    pub async fn create_with(
        db: &Database,
        username: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> User {
        let store = PgUserStore::new(db.pool.clone());
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password),
            role: role.to_string(),
            active: true,
            last_login: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };

        store.create(&user).await.unwrap()
    }
}
