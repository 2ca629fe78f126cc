use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ForgeStore, TaskUpdate};
use crate::models::credential::{Credential, CredentialOwner};
use crate::models::task::{Comment, NewTask, Project, Task, TaskPatch};
use crate::models::user::{User, Worker};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const CREDENTIAL_COLUMNS: &str =
    "id, lookup, key_hash, role, user_id, worker_id, name, created_at, expires_at";

const TASK_COLUMNS: &str = "t.id, t.project_id, t.title, t.description, t.detail, t.notes, t.status, \
     t.assigned_worker_id, t.created_at, t.updated_at, t.deleted_at";

#[async_trait]
impl ForgeStore for PgStore {
    // -- User Operations --

    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO forge_users (id, username, email, password_hash, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            // 23505: a concurrent registration won the unique index
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, created_at FROM forge_users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, created_at FROM forge_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, created_at FROM forge_users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    // -- Worker Operations --

    async fn insert_worker(&self, worker: &Worker) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO forge_workers (id, user_id, name, created_at, deleted_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(worker.id)
        .bind(worker.user_id)
        .bind(&worker.name)
        .bind(worker.created_at)
        .bind(worker.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_worker(&self, id: Uuid) -> anyhow::Result<Option<Worker>> {
        let row = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, user_id, name, created_at, deleted_at FROM forge_workers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_workers(&self, user_id: Uuid) -> anyhow::Result<Vec<Worker>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT id, user_id, name, created_at, deleted_at FROM forge_workers \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn tombstone_worker(&self, id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE forge_workers SET deleted_at = $3 WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_workers(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM forge_credentials WHERE worker_id IN \
             (SELECT id FROM forge_workers WHERE deleted_at < $1)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM forge_workers WHERE deleted_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    // -- Credential Operations --

    async fn insert_credential(&self, cred: &Credential) -> anyhow::Result<()> {
        let (user_id, worker_id) = cred.owner.columns();
        sqlx::query(
            r#"INSERT INTO forge_credentials (id, lookup, key_hash, role, user_id, worker_id, name, created_at, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(cred.id)
        .bind(&cred.lookup)
        .bind(&cred.hash)
        .bind(cred.role.as_str())
        .bind(user_id)
        .bind(worker_id)
        .bind(&cred.label)
        .bind(cred.created_at)
        .bind(cred.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_credentials(&self, lookup: &str) -> anyhow::Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM forge_credentials WHERE lookup = $1",
            CREDENTIAL_COLUMNS
        ))
        .bind(lookup)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn list_credentials(&self, owner: CredentialOwner) -> anyhow::Result<Vec<Credential>> {
        let (user_id, worker_id) = owner.columns();
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM forge_credentials \
             WHERE user_id IS NOT DISTINCT FROM $1 AND worker_id IS NOT DISTINCT FROM $2 \
             ORDER BY created_at ASC",
            CREDENTIAL_COLUMNS
        ))
        .bind(user_id)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn delete_credential(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM forge_credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_owned_credential(&self, id: Uuid, owner: CredentialOwner) -> anyhow::Result<bool> {
        let (user_id, worker_id) = owner.columns();
        let result = sqlx::query(
            "DELETE FROM forge_credentials WHERE id = $1 \
             AND user_id IS NOT DISTINCT FROM $2 AND worker_id IS NOT DISTINCT FROM $3",
        )
        .bind(id)
        .bind(user_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM forge_credentials WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -- Project Operations --

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO forge_projects (id, owner_id, name, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(project.id)
        .bind(project.owner_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid, owner_id: Uuid) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, owner_id, name, description, created_at, updated_at, deleted_at FROM forge_projects \
             WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, owner_id, name, description, created_at, updated_at, deleted_at FROM forge_projects \
             WHERE owner_id = $1 AND name = $2 AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_projects(&self, owner_id: Uuid) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, owner_id, name, description, created_at, updated_at, deleted_at FROM forge_projects \
             WHERE owner_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // -- Task Operations --

    async fn create_task(&self, owner_id: Uuid, new: &NewTask, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"INSERT INTO forge_tasks AS t (id, project_id, title, description, detail, notes, status, assigned_worker_id, created_at, updated_at)
               SELECT $1, p.id, $3, $4, $5, $6, 'todo', $7, $8, $8
               FROM forge_projects p
               WHERE p.id = $2 AND p.owner_id = $9 AND p.deleted_at IS NULL
               RETURNING t.id, t.project_id, t.title, t.description, t.detail, t.notes, t.status,
                         t.assigned_worker_id, t.created_at, t.updated_at, t.deleted_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.project_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.detail)
        .bind(&new.notes)
        .bind(new.assigned_worker_id)
        .bind(now)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn get_task(&self, id: Uuid, owner_id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM forge_tasks t JOIN forge_projects p ON p.id = t.project_id \
             WHERE t.id = $1 AND p.owner_id = $2 AND ($3 OR t.deleted_at IS NULL)",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, project_id: Uuid, owner_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM forge_tasks t JOIN forge_projects p ON p.id = t.project_id \
             WHERE t.project_id = $1 AND p.owner_id = $2 AND p.deleted_at IS NULL AND t.deleted_at IS NULL \
             ORDER BY t.created_at ASC",
            TASK_COLUMNS
        ))
        .bind(project_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        expected_assignee: Option<Uuid>,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TaskUpdate> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM forge_tasks t JOIN forge_projects p ON p.id = t.project_id \
             WHERE t.id = $1 AND p.owner_id = $2 AND t.deleted_at IS NULL FOR UPDATE OF t",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(TaskUpdate::Missing);
        };
        let mut task = Task::try_from(row)?;
        if let Some(worker_id) = expected_assignee {
            if task.assigned_worker_id != Some(worker_id) {
                return Ok(TaskUpdate::Reassigned);
            }
        }
        patch.apply(&mut task, now);

        sqlx::query(
            r#"UPDATE forge_tasks SET title = $2, description = $3, detail = $4, notes = $5,
                   status = $6, assigned_worker_id = $7, updated_at = $8
               WHERE id = $1"#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.detail)
        .bind(&task.notes)
        .bind(task.status.as_str())
        .bind(task.assigned_worker_id)
        .bind(task.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(TaskUpdate::Updated(task))
    }

    async fn delete_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE forge_tasks t SET deleted_at = $3, updated_at = $3 FROM forge_projects p \
             WHERE t.id = $1 AND p.id = t.project_id AND p.owner_id = $2 AND t.deleted_at IS NULL \
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn restore_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE forge_tasks t SET deleted_at = NULL, updated_at = $3 FROM forge_projects p \
             WHERE t.id = $1 AND p.id = t.project_id AND p.owner_id = $2 \
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    // -- Comment Operations --

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO forge_task_comments (id, task_id, author_type, author_id, content, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(comment.id)
        .bind(comment.task_id)
        .bind(comment.author_type.as_str())
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_comments(&self, task_id: Uuid) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id, task_id, author_type, author_id, content, created_at FROM forge_task_comments \
             WHERE task_id = $1 ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Comment::try_from).collect()
    }
}

// -- Rows --

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<WorkerRow> for Worker {
    fn from(r: WorkerRow) -> Self {
        Worker {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            created_at: r.created_at,
            deleted_at: r.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    lookup: String,
    key_hash: String,
    role: String,
    user_id: Option<Uuid>,
    worker_id: Option<Uuid>,
    name: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = anyhow::Error;

    fn try_from(r: CredentialRow) -> anyhow::Result<Self> {
        Ok(Credential {
            id: r.id,
            lookup: r.lookup,
            hash: r.key_hash,
            role: r.role.parse()?,
            owner: CredentialOwner::from_columns(r.user_id, r.worker_id)?,
            label: r.name,
            created_at: r.created_at,
            expires_at: r.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Project {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    title: String,
    description: Option<String>,
    detail: Option<String>,
    notes: Option<String>,
    status: String,
    assigned_worker_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(r: TaskRow) -> anyhow::Result<Self> {
        Ok(Task {
            id: r.id,
            project_id: r.project_id,
            title: r.title,
            description: r.description,
            detail: r.detail,
            notes: r.notes,
            status: r.status.parse()?,
            assigned_worker_id: r.assigned_worker_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    task_id: Uuid,
    author_type: String,
    author_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = anyhow::Error;

    fn try_from(r: CommentRow) -> anyhow::Result<Self> {
        Ok(Comment {
            id: r.id,
            task_id: r.task_id,
            author_type: r.author_type.parse()?,
            author_id: r.author_id,
            content: r.content,
            created_at: r.created_at,
        })
    }
}
