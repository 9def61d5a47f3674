//! Contract for the external WorkStudio work-order API.
//!
//! [`WorkStudioApi`] is the seam the rest of the workspace talks to.
//! [`http::HttpWorkStudioClient`] speaks JSON over HTTP to a WorkStudio
//! gateway; [`memory::InMemoryWorkStudio`] serves fixture data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{domain::UserId, status::WorkStudioStatus};
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::{Credentials, HttpWorkStudioClient};
pub use memory::InMemoryWorkStudio;

#[derive(Debug, Error)]
pub enum WorkStudioError {
    #[error("workstudio request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("workstudio returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("workstudio resource not found: {0}")]
    NotFound(String),
    #[error("invalid workstudio base url '{0}'")]
    InvalidBaseUrl(String),
}

pub type Result<T> = std::result::Result<T, WorkStudioError>;

/// A single name/value predicate applied to a WorkStudio view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFilter {
    pub name: String,
    pub value: String,
}

impl ViewFilter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn by_status(status: WorkStudioStatus) -> Self {
        Self::new("status", status.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    pub work_order: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub title: String,
    pub status: WorkStudioStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<String>,
    #[serde(default)]
    pub total_miles: f64,
    #[serde(default)]
    pub completed_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub work_order: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Service,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsInfo {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[async_trait]
pub trait WorkStudioApi: Send + Sync {
    /// Reachability check. Failures are reported as `false`, never as errors.
    async fn health_check(&self) -> bool;

    async fn get_view_data(
        &self,
        view_guid: &str,
        filter: &ViewFilter,
        user_id: Option<UserId>,
    ) -> Result<serde_json::Value>;

    async fn get_circuits_by_status(
        &self,
        status: WorkStudioStatus,
        user_id: Option<UserId>,
    ) -> Result<Vec<Circuit>>;

    async fn get_planned_units(
        &self,
        work_order: &str,
        user_id: Option<UserId>,
    ) -> Result<Vec<PlannedUnit>>;

    /// The account calls made on behalf of `user_id` authenticate as. Users
    /// without their own credentials fall back to the service account.
    async fn get_current_credentials_info(&self, user_id: Option<UserId>) -> CredentialsInfo;
}
