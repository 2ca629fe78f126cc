pub mod credentials;
pub mod fields;
pub mod metrics;
pub mod rate_limit;
pub mod rbac;
