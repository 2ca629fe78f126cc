use crate::errors::{AppError, Denial};
use crate::models::task::Task;
use crate::models::user::Worker;

/// Task fields a worker may write. Everything else is owner-only.
pub const WORKER_WRITABLE_FIELDS: &[&str] = &["status", "notes"];

/// Worker must be the task's assignee.
pub fn check_worker_assignment(worker: &Worker, task: &Task) -> Result<(), AppError> {
    if task.assigned_worker_id == Some(worker.id) {
        Ok(())
    } else {
        tracing::warn!(
            worker_id = %worker.id,
            task_id = %task.id,
            "worker touched a task it is not assigned to"
        );
        Err(AppError::Forbidden(Denial::NotAssigned))
    }
}

/// Gate for a worker's partial update. Assignment is checked before field names,
/// so an unassigned worker learns nothing about which fields would be allowed.
pub fn check_worker_update<'a, I>(worker: &Worker, task: &Task, fields: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a str>,
{
    check_worker_assignment(worker, task)?;

    if let Some(field) = fields
        .into_iter()
        .find(|f| !WORKER_WRITABLE_FIELDS.contains(f))
    {
        tracing::warn!(
            worker_id = %worker.id,
            task_id = %task.id,
            field,
            "worker update rejected by field gate"
        );
        return Err(AppError::Forbidden(Denial::FieldNotAllowed));
    }
    Ok(())
}
