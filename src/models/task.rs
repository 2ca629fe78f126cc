use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            other => anyhow::bail!("unknown task status '{}'", other),
        }
    }
}

/// Canonical task representation. This exact shape is the broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub assigned_worker_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub notes: Option<String>,
    pub assigned_worker_id: Option<Uuid>,
}

/// Every field name a task update may carry.
pub const TASK_FIELDS: &[&str] = &[
    "title",
    "description",
    "detail",
    "notes",
    "status",
    "assigned_worker_id",
];

/// A partial update. Outer `None` = field not requested; for nullable
/// columns an inner `None` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub detail: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub assigned_worker_id: Option<Option<Uuid>>,
}

impl TaskPatch {
    /// Parse a raw JSON object. Unknown names and ill-typed values are rejected.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, AppError> {
        let mut patch = TaskPatch::default();
        for (name, value) in fields {
            match name.as_str() {
                "title" => {
                    let title = value
                        .as_str()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .ok_or_else(|| AppError::Validation("title must be a non-empty string".into()))?;
                    patch.title = Some(title.to_string());
                }
                "description" => patch.description = Some(nullable_string(&name, value)?),
                "detail" => patch.detail = Some(nullable_string(&name, value)?),
                "notes" => patch.notes = Some(nullable_string(&name, value)?),
                "status" => {
                    let status = serde_json::from_value::<TaskStatus>(value)
                        .map_err(|_| AppError::Validation("status must be one of todo, in_progress, done, blocked".into()))?;
                    patch.status = Some(status);
                }
                "assigned_worker_id" => {
                    let id = match value {
                        Value::Null => None,
                        Value::String(s) => Some(Uuid::parse_str(&s).map_err(|_| {
                            AppError::Validation("assigned_worker_id must be a UUID".into())
                        })?),
                        _ => {
                            return Err(AppError::Validation(
                                "assigned_worker_id must be a UUID or null".into(),
                            ))
                        }
                    };
                    patch.assigned_worker_id = Some(id);
                }
                other => {
                    return Err(AppError::Validation(format!(
                        "unknown field '{}', expected one of: {}",
                        other,
                        TASK_FIELDS.join(", ")
                    )))
                }
            }
        }
        Ok(patch)
    }

    /// Names of the fields this patch touches.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.title.is_some() {
            names.push("title");
        }
        if self.description.is_some() {
            names.push("description");
        }
        if self.detail.is_some() {
            names.push("detail");
        }
        if self.notes.is_some() {
            names.push("notes");
        }
        if self.status.is_some() {
            names.push("status");
        }
        if self.assigned_worker_id.is_some() {
            names.push("assigned_worker_id");
        }
        names
    }

    /// Merge the requested fields into `task`; everything else is untouched.
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(detail) = &self.detail {
            task.detail = detail.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(worker) = self.assigned_worker_id {
            task.assigned_worker_id = worker;
        }
        task.updated_at = now;
    }
}

fn nullable_string(name: &str, value: Value) -> Result<Option<String>, AppError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(AppError::Validation(format!("{} must be a string or null", name))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorType {
    User,
    Worker,
}

impl AuthorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorType::User => "USER",
            AuthorType::Worker => "WORKER",
        }
    }
}

impl FromStr for AuthorType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(AuthorType::User),
            "WORKER" => Ok(AuthorType::Worker),
            other => anyhow::bail!("unknown author type '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_type: AuthorType,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
