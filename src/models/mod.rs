pub mod actor;
pub mod credential;
pub mod task;
pub mod user;
