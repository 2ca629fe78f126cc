use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::registry::{ConnectionRegistry, DeliveryReport, Frame, Scope};
use crate::middleware::metrics::ForgeMetrics;
use crate::models::task::{Comment, Task};

/// `type` discriminator of a realtime frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskRestored,
    CommentCreated,
    EntryCreated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskCreated => "TASK_CREATED",
            EventKind::TaskUpdated => "TASK_UPDATED",
            EventKind::TaskDeleted => "TASK_DELETED",
            EventKind::TaskRestored => "TASK_RESTORED",
            EventKind::CommentCreated => "COMMENT_CREATED",
            EventKind::EntryCreated => "ENTRY_CREATED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: EventKind,
    payload: &'a T,
}

/// Fans state-change events out to the channels of a scope.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ForgeMetrics>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<ForgeMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Serializes `{"type": kind, "payload": payload}` once and delivers it.
    /// Scopes with no channels are skipped before serialization.
    pub fn broadcast<T: Serialize>(&self, scope: Scope, kind: EventKind, payload: &T) -> DeliveryReport {
        if !self.registry.contains(scope) {
            return DeliveryReport::default();
        }

        let frame: Frame = match serde_json::to_string(&Envelope { kind, payload }) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!("failed to serialize {} event: {}", kind, e);
                return DeliveryReport::default();
            }
        };

        let report = self.registry.deliver(scope, &frame);
        self.metrics.record_delivery(&report);
        tracing::debug!(
            scope = %scope,
            kind = kind.as_str(),
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast"
        );
        report
    }

    /// Task lifecycle events go to the task's project scope.
    pub fn task_event(&self, kind: EventKind, task: &Task) -> DeliveryReport {
        self.broadcast(Scope::Project(task.project_id), kind, task)
    }

    pub fn comment_created(&self, project_id: uuid::Uuid, comment: &Comment) -> DeliveryReport {
        self.broadcast(Scope::Project(project_id), EventKind::CommentCreated, comment)
    }

    /// Forum entries go to their thread scope.
    pub fn entry_created<T: Serialize>(&self, thread_id: uuid::Uuid, entry: &T) -> DeliveryReport {
        self.broadcast(Scope::Thread(thread_id), EventKind::EntryCreated, entry)
    }
}
