use axum::{extract::State, http::header, response::IntoResponse};

use crate::lifecycle::StatusHandle;

/// `GET /status`: literal `true` while the dispatcher is accepting.
pub async fn get_status(State(status): State<StatusHandle>) -> impl IntoResponse {
    let body = if status.is_running() { "true" } else { "false" };
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}
