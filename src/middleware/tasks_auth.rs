// SPDX-License-Identifier: MIT

//! Scheduler authentication middleware for `/tasks/*` routes.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Require the scheduler queue header for `/tasks/*` routes.
///
/// The ingress proxy strips this header from external requests, so its
/// presence guarantees internal origin. We also verify the queue name to
/// ensure it matches our maintenance queue.
pub async fn require_tasks_auth(request: Request, next: Next) -> Result<Response, StatusCode> {
    let queue_name_header = request.headers().get("x-scheduler-queue");
    let is_valid_queue = queue_name_header
        .and_then(|h| h.to_str().ok())
        .map(|name| name == crate::config::MAINTENANCE_QUEUE_NAME)
        .unwrap_or(false);

    if !is_valid_queue {
        tracing::warn!(
            header = ?queue_name_header,
            "Blocked tasks request with invalid queue header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
