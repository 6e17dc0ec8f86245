// SPDX-License-Identifier: MIT

//! Middleware modules (authentication, security, etc.).

pub mod auth;
pub mod security;
pub mod tasks_auth;

pub use auth::require_auth;
pub use tasks_auth::require_tasks_auth;
