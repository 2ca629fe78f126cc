//! Live channel membership per scope.
//!
//! A scope entry exists only while it has at least one channel. All changes
//! to a scope's channel list (connect, disconnect, prune on failed send, entry
//! removal) happen under that key's DashMap entry guard, so they are
//! serialized per scope while unrelated scopes proceed in parallel. Delivery
//! uses `try_send`, so nothing awaits while a guard is held.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// A serialized frame shared by every channel it is delivered to.
pub type Frame = Arc<str>;

/// Grouping key for realtime channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Thread(Uuid),
    Project(Uuid),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Thread(id) => write!(f, "thread:{}", id),
            Scope::Project(id) => write!(f, "project:{}", id),
        }
    }
}

/// The sending half of one connected client's outbound queue.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
}

impl Subscriber {
    /// New subscriber with a bounded queue of `buffer` frames.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Outcome of one broadcast. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    scopes: DashMap<Scope, Vec<Subscriber>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sub` under `scope`. Registering the same subscriber twice is a no-op.
    pub fn connect(&self, scope: Scope, sub: Subscriber) {
        let mut subs = self.scopes.entry(scope).or_default();
        if !subs.iter().any(|s| s.id == sub.id) {
            subs.push(sub);
        }
    }

    /// Removes a subscriber, dropping the scope entry once it is empty.
    pub fn disconnect(&self, scope: Scope, id: Uuid) -> bool {
        match self.scopes.entry(scope) {
            Entry::Occupied(mut occ) => {
                let subs = occ.get_mut();
                let before = subs.len();
                subs.retain(|s| s.id != id);
                let removed = subs.len() != before;
                if subs.is_empty() {
                    occ.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Hands `frame` to every channel under `scope` without waiting.
    ///
    /// A channel whose receiver is gone or whose queue is full is removed
    /// in the same pass. Unknown scopes are a no-op.
    pub fn deliver(&self, scope: Scope, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if let Entry::Occupied(mut occ) = self.scopes.entry(scope) {
            let subs = occ.get_mut();
            let before = subs.len();
            subs.retain(|s| match s.tx.try_send(Arc::clone(frame)) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(scope = %scope, conn_id = %s.id, "outbound queue full, dropping channel");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
            report.pruned = before - subs.len();
            if subs.is_empty() {
                occ.remove();
            }
        }
        report
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.scopes.contains_key(&scope)
    }

    pub fn channel_count(&self, scope: Scope) -> usize {
        self.scopes.get(&scope).map(|s| s.len()).unwrap_or(0)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[test]
    fn test_connect_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let scope = Scope::Project(Uuid::new_v4());
        let (sub, _rx) = Subscriber::channel(4);
        reg.connect(scope, sub.clone());
        reg.connect(scope, sub);
        assert_eq!(reg.channel_count(scope), 1);
    }

    #[test]
    fn test_last_disconnect_removes_scope() {
        let reg = ConnectionRegistry::new();
        let scope = Scope::Thread(Uuid::new_v4());
        let (a, _ra) = Subscriber::channel(4);
        let (b, _rb) = Subscriber::channel(4);
        let (a_id, b_id) = (a.id(), b.id());
        reg.connect(scope, a);
        reg.connect(scope, b);

        assert!(reg.disconnect(scope, a_id));
        assert!(reg.contains(scope));
        assert!(reg.disconnect(scope, b_id));
        assert!(!reg.contains(scope));
        assert!(!reg.disconnect(scope, b_id));
        assert_eq!(reg.scope_count(), 0);
    }

    #[tokio::test]
    async fn test_deliver_reaches_only_target_scope() {
        let reg = ConnectionRegistry::new();
        let s = Scope::Project(Uuid::new_v4());
        let t = Scope::Project(Uuid::new_v4());

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (sub, rx) = Subscriber::channel(4);
            reg.connect(s, sub);
            receivers.push(rx);
        }
        let (other, mut other_rx) = Subscriber::channel(4);
        reg.connect(t, other);

        let report = reg.deliver(s, &frame("hello"));
        assert_eq!(report, DeliveryReport { delivered: 3, pruned: 0 });
        for rx in receivers.iter_mut() {
            assert_eq!(&*rx.recv().await.unwrap(), "hello");
        }
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_pruned() {
        let reg = ConnectionRegistry::new();
        let scope = Scope::Project(Uuid::new_v4());
        let (a, _ra) = Subscriber::channel(4);
        let (b, rb) = Subscriber::channel(4);
        reg.connect(scope, a);
        reg.connect(scope, b);
        drop(rb);

        let report = reg.deliver(scope, &frame("x"));
        assert_eq!(report, DeliveryReport { delivered: 1, pruned: 1 });
        assert_eq!(reg.channel_count(scope), 1);
    }

    #[test]
    fn test_full_queue_is_pruned_and_scope_removed() {
        let reg = ConnectionRegistry::new();
        let scope = Scope::Thread(Uuid::new_v4());
        let (sub, _rx) = Subscriber::channel(1);
        reg.connect(scope, sub);

        assert_eq!(reg.deliver(scope, &frame("1")).delivered, 1);
        let report = reg.deliver(scope, &frame("2"));
        assert_eq!(report, DeliveryReport { delivered: 0, pruned: 1 });
        assert!(!reg.contains(scope));
    }

    #[test]
    fn test_unknown_scope_is_noop() {
        let reg = ConnectionRegistry::new();
        let report = reg.deliver(Scope::Thread(Uuid::new_v4()), &frame("x"));
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(reg.scope_count(), 0);
    }

    #[test]
    fn test_scope_display() {
        let id = Uuid::nil();
        assert_eq!(Scope::Project(id).to_string(), format!("project:{}", id));
        assert_eq!(Scope::Thread(id).to_string(), format!("thread:{}", id));
    }
}
