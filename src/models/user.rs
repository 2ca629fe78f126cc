use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human account. Holds OWNER and SESSION credentials and owns workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. Never serialized out of the process.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// An automated agent acting on behalf of exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Tombstone. A deleted worker keeps its row but can no longer authenticate.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
