use serde::Serialize;
use uuid::Uuid;

use super::credential::{CredentialOwner, CredentialRole};
use super::user::{User, Worker};

/// The principal behind a verified credential.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Actor {
    User(User),
    Worker(Worker),
}

impl Actor {
    /// The user whose data this actor operates on. For a worker that is its owner.
    pub fn principal_user_id(&self) -> Uuid {
        match self {
            Actor::User(u) => u.id,
            Actor::Worker(w) => w.user_id,
        }
    }

    pub fn owner_ref(&self) -> CredentialOwner {
        match self {
            Actor::User(u) => CredentialOwner::User(u.id),
            Actor::Worker(w) => CredentialOwner::Worker(w.id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Actor::User(_) => "user",
            Actor::Worker(_) => "worker",
        }
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub credential_id: Uuid,
    pub role: CredentialRole,
    pub actor: Actor,
}
