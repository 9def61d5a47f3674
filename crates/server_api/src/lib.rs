use std::sync::Arc;

use shared::error::{ApiError, ErrorCode};
use storage::Storage;
use tracing::warn;
use workstudio::{WorkStudioApi, WorkStudioError};

pub mod access;
pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod onboarding;
pub mod work_orders;

pub use access::{evaluate, GateDecision, Principal};
pub use auth::SessionConfig;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub workstudio: Arc<dyn WorkStudioApi>,
    pub sessions: SessionConfig,
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

fn upstream(err: WorkStudioError) -> ApiError {
    match err {
        WorkStudioError::NotFound(what) => {
            ApiError::new(ErrorCode::NotFound, format!("{what} not found"))
        }
        other => {
            warn!(error = %other, "workstudio call failed");
            ApiError::new(ErrorCode::Upstream, other.to_string())
        }
    }
}


#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
