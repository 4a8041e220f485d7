//! # Idempotency Record Model
//!
//! One row per `(key, task_name)` pair in the `idempotency_keys` table. The
//! record is the durable side of the at-most-one-visible-success guarantee:
//! a PROCESSING row with a fresh lock blocks concurrent attempts, a COMPLETED
//! row replays its stored payload, and a FAILED or stale-locked row may be
//! re-acquired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::time::Duration;

/// Lifecycle status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for IdempotencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid idempotency status: {s}")),
        }
    }
}

/// A persisted idempotency record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub task_name: String,
    pub workflow_id: Option<String>,
    pub status: String,
    pub locked_at: Option<DateTime<Utc>>,
    pub result_payload: Option<serde_json::Value>,
    pub error_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Parse the persisted status string into the typed status.
    pub fn parsed_status(&self) -> Result<IdempotencyStatus, String> {
        self.status.parse()
    }

    /// Whether a PROCESSING lock is older than the configured timeout.
    ///
    /// Records without a `locked_at` timestamp are treated as expired so a
    /// retrying caller can always re-acquire a malformed row.
    pub fn is_lock_expired(&self, lock_timeout: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => Utc::now()
                .signed_duration_since(locked_at)
                .to_std()
                .map(|age| age >= lock_timeout)
                .unwrap_or(false),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(locked_at: Option<DateTime<Utc>>) -> IdempotencyRecord {
        IdempotencyRecord {
            key: "req-1".to_string(),
            task_name: "WCHA".to_string(),
            workflow_id: None,
            status: "processing".to_string(),
            locked_at,
            result_payload: None,
            error_payload: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_lock_is_not_expired() {
        let rec = record(Some(Utc::now()));
        assert!(!rec.is_lock_expired(Duration::from_secs(300)));
    }

    #[test]
    fn test_old_lock_is_expired() {
        let rec = record(Some(Utc::now() - ChronoDuration::seconds(600)));
        assert!(rec.is_lock_expired(Duration::from_secs(300)));
    }

    #[test]
    fn test_missing_lock_timestamp_is_expired() {
        let rec = record(None);
        assert!(rec.is_lock_expired(Duration::from_secs(300)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "completed".parse::<IdempotencyStatus>().unwrap(),
            IdempotencyStatus::Completed
        );
        assert!("done".parse::<IdempotencyStatus>().is_err());
    }
}
