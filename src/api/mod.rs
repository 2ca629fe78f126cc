use std::sync::Arc;

use axum::{
    extract::FromRequest,
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::errors::AppError;
use crate::middleware::rate_limit;
use crate::AppState;

pub mod handlers;
pub mod tasks;

/// `axum::Json` whose rejection renders the standard error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Build the Forge API router.
/// All routes are relative; the caller mounts this under `/api/forge`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let throttled = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(state, rate_limit::throttle));

    Router::new()
        .merge(throttled)
        .route("/auth/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/keys", get(handlers::list_keys).post(handlers::create_key))
        .route("/keys/:id", delete(handlers::revoke_key))
        .route(
            "/workers",
            get(handlers::list_workers).post(handlers::create_worker),
        )
        .route("/workers/:id", delete(handlers::delete_worker))
        .route(
            "/workers/:id/keys",
            get(handlers::list_worker_keys).post(handlers::create_worker_key),
        )
        .route(
            "/workers/:id/keys/:key_id",
            delete(handlers::revoke_worker_key),
        )
        .route(
            "/projects",
            get(tasks::list_projects).post(tasks::create_project),
        )
        .route("/projects/:id/tasks", get(tasks::list_tasks))
        .route("/tasks", post(tasks::create_task))
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/:id/restore", post(tasks::restore_task))
        .route(
            "/tasks/:id/comments",
            get(tasks::list_comments).post(tasks::create_comment),
        )
}
