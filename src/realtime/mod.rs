//! Per-scope publish/subscribe over WebSockets.

pub mod dispatcher;
pub mod registry;
pub mod socket;

pub use dispatcher::{Broadcaster, EventKind};
pub use registry::{ConnectionRegistry, DeliveryReport, Scope, Subscriber};
