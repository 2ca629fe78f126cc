use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ForgeStore, TaskUpdate};
use crate::models::credential::{Credential, CredentialOwner};
use crate::models::task::{Comment, NewTask, Project, Task, TaskPatch, TaskStatus};
use crate::models::user::{User, Worker};

/// In-process store backed by DashMaps.
///
/// Credentials are indexed by lookup key so verification never scans the
/// whole table.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    /// Unique claims on usernames and lowercased emails.
    usernames: DashMap<String, Uuid>,
    emails: DashMap<String, Uuid>,
    workers: DashMap<Uuid, Worker>,
    credentials: DashMap<Uuid, Credential>,
    lookup_index: DashMap<String, Vec<Uuid>>,
    projects: DashMap<Uuid, Project>,
    tasks: DashMap<Uuid, Task>,
    comments: DashMap<Uuid, Vec<Comment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credential rows, tombstoned owners included.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    fn unindex(&self, cred: &Credential) {
        if let Entry::Occupied(mut entry) =
            self.lookup_index.entry(cred.lookup.clone())
        {
            entry.get_mut().retain(|id| *id != cred.id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    fn remove_credential_if(&self, id: Uuid, pred: impl FnOnce(&Credential) -> bool) -> bool {
        match self.credentials.remove_if(&id, |_, c| pred(c)) {
            Some((_, cred)) => {
                self.unindex(&cred);
                true
            }
            None => false,
        }
    }

    fn remove_credential_where(&self, pred: impl Fn(&Credential) -> bool) -> u64 {
        let doomed: Vec<Uuid> = self
            .credentials
            .iter()
            .filter(|c| pred(c.value()))
            .map(|c| *c.key())
            .collect();
        let mut removed = 0;
        for id in doomed {
            if let Some((_, cred)) = self.credentials.remove(&id) {
                self.unindex(&cred);
                removed += 1;
            }
        }
        removed
    }

    fn owns_project(&self, project_id: Uuid, owner_id: Uuid, live_only: bool) -> bool {
        self.projects
            .get(&project_id)
            .map(|p| p.owner_id == owner_id && (!live_only || p.deleted_at.is_none()))
            .unwrap_or(false)
    }

    /// Runs `f` on an owned task under its entry lock and returns the result.
    fn with_owned_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        f: impl FnOnce(&mut Task) -> bool,
    ) -> Option<Task> {
        let mut task = self.tasks.get_mut(&id)?;
        if !self.owns_project(task.project_id, owner_id, false) {
            return None;
        }
        if f(&mut task) {
            Some(task.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl ForgeStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        match self.emails.entry(user.email.to_lowercase()) {
            Entry::Occupied(_) => {
                self.usernames.remove(&user.username);
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.clone()))
    }

    async fn insert_worker(&self, worker: &Worker) -> anyhow::Result<()> {
        self.workers.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn get_worker(&self, id: Uuid) -> anyhow::Result<Option<Worker>> {
        Ok(self.workers.get(&id).map(|w| w.clone()))
    }

    async fn list_workers(&self, user_id: Uuid) -> anyhow::Result<Vec<Worker>> {
        let mut workers: Vec<Worker> = self
            .workers
            .iter()
            .filter(|w| w.user_id == user_id && !w.is_deleted())
            .map(|w| w.clone())
            .collect();
        workers.sort_by_key(|w| w.created_at);
        Ok(workers)
    }

    async fn tombstone_worker(&self, id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        match self.workers.get_mut(&id) {
            Some(mut w) if w.user_id == user_id && !w.is_deleted() => {
                w.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_workers(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let doomed: Vec<Uuid> = self
            .workers
            .iter()
            .filter(|w| w.deleted_at.map(|d| d < cutoff).unwrap_or(false))
            .map(|w| w.id)
            .collect();
        for id in &doomed {
            self.remove_credential_where(|c| c.owner == CredentialOwner::Worker(*id));
            self.workers.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn insert_credential(&self, cred: &Credential) -> anyhow::Result<()> {
        self.credentials.insert(cred.id, cred.clone());
        self.lookup_index
            .entry(cred.lookup.clone())
            .or_default()
            .push(cred.id);
        Ok(())
    }

    async fn find_credentials(&self, lookup: &str) -> anyhow::Result<Vec<Credential>> {
        let ids = match self.lookup_index.get(lookup) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.credentials.get(id).map(|c| c.clone()))
            .collect())
    }

    async fn list_credentials(&self, owner: CredentialOwner) -> anyhow::Result<Vec<Credential>> {
        let mut creds: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.owner == owner)
            .map(|c| c.clone())
            .collect();
        creds.sort_by_key(|c| c.created_at);
        Ok(creds)
    }

    async fn delete_credential(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.remove_credential_if(id, |_| true))
    }

    async fn delete_owned_credential(&self, id: Uuid, owner: CredentialOwner) -> anyhow::Result<bool> {
        Ok(self.remove_credential_if(id, |c| c.owner == owner))
    }

    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(self.remove_credential_where(|c| c.is_expired_at(now)))
    }

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        self.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid, owner_id: Uuid) -> anyhow::Result<Option<Project>> {
        Ok(self
            .projects
            .get(&id)
            .filter(|p| p.owner_id == owner_id && p.deleted_at.is_none())
            .map(|p| p.clone()))
    }

    async fn find_project_by_name(&self, owner_id: Uuid, name: &str) -> anyhow::Result<Option<Project>> {
        Ok(self
            .projects
            .iter()
            .find(|p| p.owner_id == owner_id && p.deleted_at.is_none() && p.name == name)
            .map(|p| p.clone()))
    }

    async fn list_projects(&self, owner_id: Uuid) -> anyhow::Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| p.owner_id == owner_id && p.deleted_at.is_none())
            .map(|p| p.clone())
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn create_task(&self, owner_id: Uuid, new: &NewTask, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        if !self.owns_project(new.project_id, owner_id, true) {
            return Ok(None);
        }
        let task = Task {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            title: new.title.clone(),
            description: new.description.clone(),
            detail: new.detail.clone(),
            notes: new.notes.clone(),
            status: TaskStatus::default(),
            assigned_worker_id: new.assigned_worker_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.tasks.insert(task.id, task.clone());
        Ok(Some(task))
    }

    async fn get_task(&self, id: Uuid, owner_id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Task>> {
        Ok(self
            .tasks
            .get(&id)
            .filter(|t| include_deleted || t.deleted_at.is_none())
            .filter(|t| self.owns_project(t.project_id, owner_id, false))
            .map(|t| t.clone()))
    }

    async fn list_tasks(&self, project_id: Uuid, owner_id: Uuid) -> anyhow::Result<Vec<Task>> {
        if !self.owns_project(project_id, owner_id, true) {
            return Ok(Vec::new());
        }
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id && t.deleted_at.is_none())
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        owner_id: Uuid,
        expected_assignee: Option<Uuid>,
        patch: &TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TaskUpdate> {
        let Some(mut task) = self.tasks.get_mut(&id) else {
            return Ok(TaskUpdate::Missing);
        };
        if task.deleted_at.is_some() || !self.owns_project(task.project_id, owner_id, false) {
            return Ok(TaskUpdate::Missing);
        }
        if let Some(worker_id) = expected_assignee {
            if task.assigned_worker_id != Some(worker_id) {
                return Ok(TaskUpdate::Reassigned);
            }
        }
        patch.apply(&mut task, now);
        Ok(TaskUpdate::Updated(task.clone()))
    }

    async fn delete_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        Ok(self.with_owned_task(id, owner_id, |task| {
            if task.deleted_at.is_some() {
                return false;
            }
            task.deleted_at = Some(now);
            task.updated_at = now;
            true
        }))
    }

    async fn restore_task(&self, id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Task>> {
        Ok(self.with_owned_task(id, owner_id, |task| {
            task.deleted_at = None;
            task.updated_at = now;
            true
        }))
    }

    async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        self.comments
            .entry(comment.task_id)
            .or_default()
            .push(comment.clone());
        Ok(())
    }

    async fn list_comments(&self, task_id: Uuid) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .comments
            .get(&task_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}
