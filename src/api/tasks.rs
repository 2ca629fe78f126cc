//! Projects, tasks and comments.
//!
//! Every successful task mutation is broadcast to the task's project scope
//! after the store has committed it. Rejected requests never broadcast.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ApiJson;
use crate::errors::{AppError, Denial};
use crate::middleware::fields::{check_worker_assignment, check_worker_update};
use crate::middleware::rbac::{CurrentActor, CurrentUser};
use crate::models::actor::Actor;
use crate::models::task::{AuthorType, Comment, NewTask, Project, Task, TaskPatch};
use crate::realtime::EventKind;
use crate::store::TaskUpdate;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// A task may only be assigned to a live worker of the same user.
async fn check_assignee(state: &AppState, owner_id: Uuid, worker_id: Uuid) -> Result<(), AppError> {
    match state.store.get_worker(worker_id).await? {
        Some(w) if w.user_id == owner_id && !w.is_deleted() => Ok(()),
        _ => Err(AppError::Validation(format!(
            "assigned_worker_id {} is not one of your workers",
            worker_id
        ))),
    }
}

async fn visible_task(state: &AppState, id: Uuid, owner_id: Uuid) -> Result<Task, AppError> {
    state
        .store
        .get_task(id, owner_id, false)
        .await?
        .ok_or(AppError::NotFound)
}

// ── Projects ─────────────────────────────────────────────────

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.store.list_projects(current.user.id).await?))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(payload): ApiJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    if state
        .store
        .find_project_by_name(current.user.id, &name)
        .await?
        .is_some()
    {
        return Err(AppError::AlreadyExists(format!("project '{}' already exists", name)));
    }

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        owner_id: current.user.id,
        name,
        description: payload.description,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    state.store.insert_project(&project).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// Workers see the projects of the user that owns them.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    current: CurrentActor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, AppError> {
    let owner_id = current.actor.principal_user_id();
    if state.store.get_project(project_id, owner_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    Ok(Json(state.store.list_tasks(project_id, owner_id).await?))
}

// ── Tasks ────────────────────────────────────────────────────

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(mut payload): ApiJson<NewTask>,
) -> Result<impl IntoResponse, AppError> {
    payload.title = payload.title.trim().to_string();
    if payload.title.is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    if let Some(worker_id) = payload.assigned_worker_id {
        check_assignee(&state, current.user.id, worker_id).await?;
    }

    let task = state
        .store
        .create_task(current.user.id, &payload, Utc::now())
        .await?
        .ok_or(AppError::NotFound)?;

    state.broadcaster.task_event(EventKind::TaskCreated, &task);
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = visible_task(&state, id, current.actor.principal_user_id()).await?;
    Ok(Json(task))
}

/// Partial update. Owners may set any field; workers go through the field gate
/// on the raw field names before anything is parsed or written.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
    ApiJson(fields): ApiJson<Map<String, Value>>,
) -> Result<Json<Task>, AppError> {
    let owner_id = current.actor.principal_user_id();

    // Workers are re-checked against the assignment under the row lock.
    let expected_assignee = match &current.actor {
        Actor::Worker(worker) => {
            let task = visible_task(&state, id, owner_id).await?;
            check_worker_update(worker, &task, fields.keys().map(String::as_str))?;
            Some(worker.id)
        }
        Actor::User(_) => None,
    };

    let patch = TaskPatch::from_fields(fields)?;
    if let Some(Some(worker_id)) = patch.assigned_worker_id {
        check_assignee(&state, owner_id, worker_id).await?;
    }

    let task = match state
        .store
        .update_task(id, owner_id, expected_assignee, &patch, Utc::now())
        .await?
    {
        TaskUpdate::Updated(task) => task,
        TaskUpdate::Missing => return Err(AppError::NotFound),
        TaskUpdate::Reassigned => {
            tracing::warn!(task_id = %id, "worker update lost race with reassignment");
            return Err(AppError::Forbidden(Denial::NotAssigned));
        }
    };

    tracing::debug!(
        task_id = %task.id,
        actor = current.actor.kind(),
        fields = ?patch.field_names(),
        "task updated"
    );
    state.broadcaster.task_event(EventKind::TaskUpdated, &task);
    Ok(Json(task))
}

/// Soft delete.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = state
        .store
        .delete_task(id, current.user.id, Utc::now())
        .await?
        .ok_or(AppError::NotFound)?;
    state.broadcaster.task_event(EventKind::TaskDeleted, &task);
    Ok(Json(task))
}

pub async fn restore_task(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = state
        .store
        .restore_task(id, current.user.id, Utc::now())
        .await?
        .ok_or(AppError::NotFound)?;
    state.broadcaster.task_event(EventKind::TaskRestored, &task);
    Ok(Json(task))
}

// ── Comments ─────────────────────────────────────────────────

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let task = visible_task(&state, id, current.actor.principal_user_id()).await?;
    Ok(Json(state.store.list_comments(task.id).await?))
}

/// Workers may only comment on tasks assigned to them.
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = visible_task(&state, id, current.actor.principal_user_id()).await?;

    let (author_type, author_id) = match &current.actor {
        Actor::User(user) => (AuthorType::User, user.id),
        Actor::Worker(worker) => {
            check_worker_assignment(worker, &task)?;
            (AuthorType::Worker, worker.id)
        }
    };

    let content = payload.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::Validation("content is required".into()));
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        task_id: task.id,
        author_type,
        author_id,
        content,
        created_at: Utc::now(),
    };
    state.store.insert_comment(&comment).await?;

    state.broadcaster.comment_created(task.project_id, &comment);
    Ok((StatusCode::CREATED, Json(comment)))
}
