// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the lifecycle, routing and tracking layers.

use reqwest::StatusCode;

/// Application error type.
///
/// Variants follow the failure taxonomy the callers act on: `Validation`
/// blocks an action before submission, `Conflict` requires a reload,
/// `Transport` may be retried (reads and route calculation only) and
/// `PermissionDenied` needs user action.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Subscription failed: {0}")]
    Stream(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether repeating the same call can succeed without user action.
    ///
    /// Lifecycle transitions must still re-read the walk before retrying,
    /// since the first attempt may have succeeded server-side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Database(_))
    }

    /// Whether the caller has to reload the walk's true state.
    pub fn requires_reload(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Short, actionable message for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Please fix the request: {}", msg),
            AppError::Conflict(_) => {
                "This walk was changed by someone else. Refresh to see its current state."
                    .to_string()
            }
            AppError::Transport(_) | AppError::Database(_) => {
                "Connection problem. Try again.".to_string()
            }
            AppError::PermissionDenied(_) => {
                "Location access is off. Enable it to share your position during the walk."
                    .to_string()
            }
            AppError::Stream(_) => "Live tracking disconnected.".to_string(),
            AppError::Unauthorized => "Your session expired. Sign in again.".to_string(),
            AppError::Forbidden(_) => "You are not allowed to change this walk.".to_string(),
            AppError::NotFound(_) => "This walk no longer exists.".to_string(),
            AppError::BadRequest(msg) => format!("The request was rejected: {}", msg),
            AppError::Backend(_) | AppError::Internal(_) => "Something went wrong.".to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Backend(format!("JSON parse error: {}", err))
        } else {
            // Timeouts, refused connections and interrupted bodies are all
            // indistinguishable from the caller's point of view.
            AppError::Transport(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Map a non-success HTTP status from the walks backend to an error.
pub fn classify_status(status: StatusCode, body: &str) -> AppError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("HTTP {}: {}", status, body)
    };

    match status.as_u16() {
        409 => AppError::Conflict(detail),
        400 | 422 => AppError::BadRequest(detail),
        401 => AppError::Unauthorized,
        403 => AppError::Forbidden(detail),
        404 => AppError::NotFound(detail),
        408 | 429 => AppError::Transport(detail),
        s if s >= 500 => AppError::Transport(detail),
        _ => AppError::Backend(detail),
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
