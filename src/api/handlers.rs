use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::ApiJson;
use crate::errors::AppError;
use crate::middleware::credentials::{hash_blocking, verify_blocking};
use crate::middleware::rbac::{CurrentActor, CurrentUser};
use crate::models::credential::{CredentialMeta, CredentialOwner, CredentialRole};
use crate::models::user::{User, Worker};
use crate::AppState;

/// Upper bound on caller-chosen key lifetimes (ten years).
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;
const MIN_PASSWORD_LEN: usize = 8;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A user plus a freshly minted key. `api_key` is shown exactly once.
#[derive(Serialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub user: User,
    pub api_key: String,
    pub key: CredentialMeta,
}

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub ttl_secs: Option<u64>,
}

#[derive(Deserialize)]
pub struct CreateWorkerRequest {
    pub name: String,
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn key_ttl(ttl_secs: Option<u64>) -> Result<Option<chrono::Duration>, AppError> {
    match ttl_secs {
        None => Ok(None),
        Some(0) => Err(AppError::Validation("ttl_secs must be positive".into())),
        Some(s) if s > MAX_TTL_SECS => Err(AppError::Validation(format!(
            "ttl_secs must be at most {}",
            MAX_TTL_SECS
        ))),
        Some(s) => Ok(Some(chrono::Duration::seconds(s as i64))),
    }
}

/// Live worker owned by `user_id`, else 404.
async fn owned_worker(state: &AppState, id: Uuid, user_id: Uuid) -> Result<Worker, AppError> {
    state
        .store
        .get_worker(id)
        .await?
        .filter(|w| w.user_id == user_id && !w.is_deleted())
        .ok_or(AppError::NotFound)
}

// ── Accounts ─────────────────────────────────────────────────

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = required("username", &payload.username)?;
    let email = required("email", &payload.email)?;
    if !email.contains('@') {
        return Err(AppError::Validation("email is not valid".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if state.store.get_user_by_username(&username).await?.is_some() {
        return Err(AppError::AlreadyExists("username already registered".into()));
    }
    if state.store.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::AlreadyExists("email already registered".into()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash: hash_blocking(payload.password, state.credentials.params()).await?,
        created_at: Utc::now(),
    };
    // the store's unique claims settle concurrent registrations
    if !state.store.insert_user(&user).await? {
        return Err(AppError::AlreadyExists("username or email already registered".into()));
    }

    let issued = state
        .credentials
        .issue(CredentialRole::Owner, CredentialOwner::User(user.id), "Default Key", None)
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            user,
            api_key: issued.api_key,
            key: issued.meta,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::Validation("invalid username or password".into());

    let user = state
        .store
        .get_user_by_username(payload.username.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_blocking(payload.password, user.password_hash.clone()).await? {
        tracing::warn!(user_id = %user.id, "failed login");
        return Err(invalid());
    }

    let ttl = chrono::Duration::from_std(state.config.session_ttl)
        .map_err(|e| anyhow::anyhow!("session ttl out of range: {}", e))?;
    let issued = state
        .credentials
        .issue(CredentialRole::Session, CredentialOwner::User(user.id), "Session Key", Some(ttl))
        .await?;

    Ok(Json(AccountResponse {
        user,
        api_key: issued.api_key,
        key: issued.meta,
    }))
}

/// Revokes the credential that authenticated this request.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state
        .credentials
        .revoke(current.credential_id, CredentialOwner::User(current.user.id))
        .await?;
    Ok(Json(json!({ "message": "logged out" })))
}

pub async fn me(current: CurrentActor) -> impl IntoResponse {
    Json(current.actor)
}

// ── User keys ────────────────────────────────────────────────

pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<CredentialMeta>>, AppError> {
    let keys = state
        .credentials
        .list(CredentialOwner::User(current.user.id))
        .await?;
    Ok(Json(keys))
}

pub async fn create_key(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<CreateKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = required("name", &payload.name)?;
    let ttl = key_ttl(payload.ttl_secs)?;
    let issued = state
        .credentials
        .issue(CredentialRole::Owner, CredentialOwner::User(current.user.id), &name, ttl)
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .credentials
        .revoke(id, CredentialOwner::User(current.user.id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Workers ──────────────────────────────────────────────────

pub async fn list_workers(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<Worker>>, AppError> {
    Ok(Json(state.store.list_workers(current.user.id).await?))
}

pub async fn create_worker(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<CreateWorkerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker = Worker {
        id: Uuid::new_v4(),
        user_id: current.user.id,
        name: required("name", &payload.name)?,
        created_at: Utc::now(),
        deleted_at: None,
    };
    state.store.insert_worker(&worker).await?;
    tracing::info!(worker_id = %worker.id, user_id = %current.user.id, "worker created");
    Ok((StatusCode::CREATED, Json(worker)))
}

/// Tombstones the worker. Its keys stay in the table but stop verifying at once.
pub async fn delete_worker(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state
        .store
        .tombstone_worker(id, current.user.id, Utc::now())
        .await?
    {
        return Err(AppError::NotFound);
    }
    tracing::info!(worker_id = %id, "worker tombstoned");
    Ok(Json(json!({ "message": "worker deleted" })))
}

pub async fn list_worker_keys(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CredentialMeta>>, AppError> {
    let worker = owned_worker(&state, id, current.user.id).await?;
    let keys = state
        .credentials
        .list(CredentialOwner::Worker(worker.id))
        .await?;
    Ok(Json(keys))
}

pub async fn create_worker_key(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<CreateKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker = owned_worker(&state, id, current.user.id).await?;
    let name = required("name", &payload.name)?;
    let ttl = key_ttl(payload.ttl_secs)?;
    let issued = state
        .credentials
        .issue(CredentialRole::Worker, CredentialOwner::Worker(worker.id), &name, ttl)
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

pub async fn revoke_worker_key(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path((id, key_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let worker = owned_worker(&state, id, current.user.id).await?;
    state
        .credentials
        .revoke(key_id, CredentialOwner::Worker(worker.id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  bot  ").unwrap(), "bot");
        assert!(matches!(required("name", "   "), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_key_ttl_bounds() {
        assert!(key_ttl(None).unwrap().is_none());
        assert_eq!(key_ttl(Some(60)).unwrap(), Some(chrono::Duration::seconds(60)));
        assert!(key_ttl(Some(0)).is_err());
        assert!(key_ttl(Some(MAX_TTL_SECS + 1)).is_err());
    }
}
