use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A live login session, one row per issued refresh token.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: DateTime<Utc>, revoked_at: Option<DateTime<Utc>>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refresh_token_hash: "hash".into(),
            ip: None,
            user_agent: None,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
            expires_at,
            revoked_at,
        }
    }

    #[test]
    fn test_active_session() {
        let s = session(Utc::now() + chrono::Duration::hours(1), None);
        assert!(s.is_active(Utc::now()));
    }

    #[test]
    fn test_expired_session() {
        let s = session(Utc::now() - chrono::Duration::hours(1), None);
        assert!(!s.is_active(Utc::now()));
    }

    #[test]
    fn test_revoked_session() {
        let s = session(Utc::now() + chrono::Duration::hours(1), Some(Utc::now()));
        assert!(!s.is_active(Utc::now()));
    }
}
