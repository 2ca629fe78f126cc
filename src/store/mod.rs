//! Storage seam.
//!
//! `ForgeStore` is the narrow interface the credential verifier and the
//! HTTP handlers consume. Two backends ship: `MemoryStore` (tests and
//! single-process dev) and `PgStore` (PostgreSQL via sqlx).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::credential::{Credential, CredentialOwner};
use crate::models::task::{Comment, NewTask, Project, Task, TaskPatch};
use crate::models::user::{User, Worker};

/// Outcome of a guarded task update.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Updated(Task),
    /// Absent, deleted or not owned by the caller.
    Missing,
    /// No longer assigned to the expected worker; nothing was written.
    Reassigned,
}

#[async_trait]
pub trait ForgeStore: Send + Sync {
    // -- Users --

    /// `false` when the username or email is already taken; nothing is written.
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    // -- Workers --

    async fn insert_worker(&self, worker: &Worker) -> anyhow::Result<()>;
    /// Returns the worker row whether or not it is tombstoned.
    async fn get_worker(&self, id: Uuid) -> anyhow::Result<Option<Worker>>;
    /// Live workers owned by `user_id`.
    async fn list_workers(&self, user_id: Uuid) -> anyhow::Result<Vec<Worker>>;
    /// Sets `deleted_at` on a live worker owned by `user_id`. Credentials are left alone.
    async fn tombstone_worker(&self, id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool>;
    /// Physically removes workers tombstoned before `cutoff` along with their credentials.
    async fn purge_workers(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;

    // -- Credentials --

    async fn insert_credential(&self, cred: &Credential) -> anyhow::Result<()>;
    /// Candidates sharing a lookup key. Usually zero or one.
    async fn find_credentials(&self, lookup: &str) -> anyhow::Result<Vec<Credential>>;
    async fn list_credentials(&self, owner: CredentialOwner) -> anyhow::Result<Vec<Credential>>;
    async fn delete_credential(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Deletes only when the credential belongs to `owner`.
    async fn delete_owned_credential(&self, id: Uuid, owner: CredentialOwner) -> anyhow::Result<bool>;
    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;

    // -- Projects --

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()>;
    /// Live project owned by `owner_id`.
    async fn get_project(&self, id: Uuid, owner_id: Uuid) -> anyhow::Result<Option<Project>>;
    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> anyhow::Result<Option<Project>>;
    async fn list_projects(&self, owner_id: Uuid) -> anyhow::Result<Vec<Project>>;

    // -- Tasks --
    // Every task lookup is scoped through project ownership; `None` covers
    // both "absent" and "not yours".

    /// `None` when the project is absent or not owned by `owner_id`.
    async fn create_task(&self, owner_id: Uuid, new: &NewTask, now: DateTime<Utc>) -> anyhow::Result<Option<Task>>;
    async fn get_task(&self, id: Uuid, owner_id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Task>>;
    /// Live tasks of a live project owned by `owner_id`.
    async fn list_tasks(&self, project_id: Uuid, owner_id: Uuid) -> anyhow::Result<Vec<Task>>;
    /// Applies `patch` under the task's row lock. With `expected_assignee` set,
    /// the write only happens while the task is still assigned to that worker.
    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        expected_assignee: Option<Uuid>,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TaskUpdate>;
    async fn delete_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>>;
    async fn restore_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>>;

    // -- Comments --

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()>;
    async fn list_comments(&self, task_id: Uuid) -> anyhow::Result<Vec<Comment>>;
}
