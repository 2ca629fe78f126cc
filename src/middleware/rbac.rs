use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::{AppError, AuthFailure, Denial};
use crate::middleware::credentials::mask;
use crate::models::actor::{Actor, Authenticated};
use crate::models::credential::CredentialRole;
use crate::models::user::User;
use crate::AppState;

/// Header carrying Forge credentials.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header used by the forum subsystem's agent secrets. Never accepted as a Forge credential.
pub const AGENT_SECRET_HEADER: &str = "x-agent-secret";

/// Strict resolution: a verified user acting through an OWNER or SESSION credential.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub credential_id: Uuid,
    pub role: CredentialRole,
}

/// Flexible resolution: any verified actor, user or worker.
#[derive(Debug, Clone)]
pub struct CurrentActor {
    pub actor: Actor,
    pub credential_id: Uuid,
    pub role: CredentialRole,
}

pub fn require_user(auth: Authenticated) -> Result<CurrentUser, AppError> {
    match (auth.role, auth.actor) {
        (CredentialRole::Owner | CredentialRole::Session, Actor::User(user)) => Ok(CurrentUser {
            user,
            credential_id: auth.credential_id,
            role: auth.role,
        }),
        (_, actor) => {
            tracing::warn!(
                credential_id = %auth.credential_id,
                actor = actor.kind(),
                "RBAC access denied: user credential required"
            );
            Err(AppError::Forbidden(Denial::WorkerNotPermitted))
        }
    }
}

pub fn require_actor(auth: Authenticated) -> CurrentActor {
    CurrentActor {
        actor: auth.actor,
        credential_id: auth.credential_id,
        role: auth.role,
    }
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Authenticated, AppError> {
    let presented = parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let Some(token) = presented else {
        if parts.headers.contains_key(AGENT_SECRET_HEADER) {
            tracing::warn!("agent secret presented to a Forge route; only X-API-Key is accepted");
        }
        state.metrics.auth_failure(AuthFailure::Missing.as_str());
        return Err(AppError::Unauthenticated(AuthFailure::Missing));
    };

    match state.credentials.verify(token).await {
        Ok(auth) => Ok(auth),
        Err(e) => {
            let reason = match &e {
                AppError::Unauthenticated(f) => f.as_str(),
                AppError::Forbidden(d) => d.as_str(),
                _ => "error",
            };
            state.metrics.auth_failure(reason);
            tracing::warn!(token = %mask(token), reason, "credential rejected");
            Err(e)
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let auth = authenticate(parts, state).await?;
        require_user(auth)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let auth = authenticate(parts, state).await?;
        Ok(require_actor(auth))
    }
}

// ── Tests ───────────────────────────────────────────────────────
