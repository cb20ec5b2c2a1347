use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single authentication attempt, recorded regardless of outcome.
///
/// `LoginAttemptStore` implementations must support a range query over
/// `(ip, username, since)` so the lockout accountant can reconstruct a
/// rolling window without a dedicated counter service.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub username: String,
    pub ip: String,
    pub succeeded: bool,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_attempt() {
        let attempt = LoginAttempt {
            id: Uuid::new_v4(),
            username: "alice".into(),
            ip: "127.0.0.1".into(),
            succeeded: false,
            occurred_at: Utc::now(),
        };
        assert!(!attempt.succeeded);
    }
}
