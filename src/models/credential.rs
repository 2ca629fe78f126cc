//! Credential records.
//!
//! A credential is the stored half of a bearer token: an Argon2 hash of the
//! plaintext plus a short non-secret lookup key used to find candidates
//! without scanning the table. The plaintext itself is only ever held by the
//! caller that received it from `issue`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Matches the `role` column in the `credentials` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialRole {
    /// Long-lived user key, minted at registration or by explicit issuance.
    Owner,
    /// Short-lived user key, minted at login.
    Session,
    /// Key held by a worker; restricted by the field gate.
    Worker,
}

impl CredentialRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialRole::Owner => "OWNER",
            CredentialRole::Session => "SESSION",
            CredentialRole::Worker => "WORKER",
        }
    }

    /// Whether a credential with this role may be owned by `owner`.
    pub fn fits(&self, owner: &CredentialOwner) -> bool {
        match (self, owner) {
            (CredentialRole::Owner | CredentialRole::Session, CredentialOwner::User(_)) => true,
            (CredentialRole::Worker, CredentialOwner::Worker(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CredentialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(CredentialRole::Owner),
            "SESSION" => Ok(CredentialRole::Session),
            "WORKER" => Ok(CredentialRole::Worker),
            other => anyhow::bail!("unknown credential role '{}'", other),
        }
    }
}

/// Exactly one owning actor per credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CredentialOwner {
    User(Uuid),
    Worker(Uuid),
}

impl CredentialOwner {
    /// Split into the `(user_id, worker_id)` column pair used by SQL backends.
    pub fn columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match *self {
            CredentialOwner::User(id) => (Some(id), None),
            CredentialOwner::Worker(id) => (None, Some(id)),
        }
    }

    pub fn from_columns(user_id: Option<Uuid>, worker_id: Option<Uuid>) -> anyhow::Result<Self> {
        match (user_id, worker_id) {
            (Some(u), None) => Ok(CredentialOwner::User(u)),
            (None, Some(w)) => Ok(CredentialOwner::Worker(w)),
            (u, w) => anyhow::bail!(
                "credential must have exactly one owner (user={:?}, worker={:?})",
                u,
                w
            ),
        }
    }
}

/// A stored credential row.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub lookup: String,
    pub hash: String,
    pub role: CredentialRole,
    pub owner: CredentialOwner,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn meta(&self) -> CredentialMeta {
        CredentialMeta {
            id: self.id,
            name: self.label.clone(),
            role: self.role,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// What the API is allowed to show about a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialMeta {
    pub id: Uuid,
    pub name: String,
    pub role: CredentialRole,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Returned from issuance only. `api_key` is unrecoverable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    #[serde(flatten)]
    pub meta: CredentialMeta,
    pub api_key: String,
}
