use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{domain::UserId, status::WorkStudioStatus};
use tracing::{debug, warn};
use url::Url;

use crate::{
    Circuit, CredentialKind, CredentialsInfo, PlannedUnit, Result, ViewFilter, WorkStudioApi,
    WorkStudioError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Talks to a WorkStudio gateway with basic auth. Calls carrying a `user_id`
/// with registered per-user credentials authenticate as that user; every other
/// call uses the service account.
#[derive(Clone)]
pub struct HttpWorkStudioClient {
    http: Client,
    base_url: Url,
    service: Credentials,
    user_credentials: HashMap<UserId, Credentials>,
}

impl HttpWorkStudioClient {
    pub fn new(base_url: &str, service: Credentials, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|_| WorkStudioError::InvalidBaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(WorkStudioError::InvalidBaseUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            service,
            user_credentials: HashMap::new(),
        })
    }

    pub fn with_user_credentials(mut self, user_id: UserId, credentials: Credentials) -> Self {
        self.user_credentials.insert(user_id, credentials);
        self
    }

    pub fn user_credentials_count(&self) -> usize {
        self.user_credentials.len()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn credentials_for(&self, user_id: Option<UserId>) -> &Credentials {
        user_id
            .and_then(|id| self.user_credentials.get(&id))
            .unwrap_or(&self.service)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authed(&self, request: RequestBuilder, user_id: Option<UserId>) -> RequestBuilder {
        let credentials = self.credentials_for(user_id);
        request.basic_auth(&credentials.username, Some(&credentials.password))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WorkStudioError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), what, "workstudio request rejected");
            return Err(WorkStudioError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl WorkStudioApi for HttpWorkStudioClient {
    async fn health_check(&self) -> bool {
        let request = self.authed(self.http.get(self.endpoint(&["health"])), None);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                warn!(%error, base_url = %self.base_url, "workstudio health check failed");
                false
            }
        }
    }

    async fn get_view_data(
        &self,
        view_guid: &str,
        filter: &ViewFilter,
        user_id: Option<UserId>,
    ) -> Result<serde_json::Value> {
        debug!(view_guid, filter = %filter.name, "workstudio: fetching view data");
        let request = self.authed(
            self.http
                .post(self.endpoint(&["views", view_guid]))
                .json(filter),
            user_id,
        );
        self.send_json(request, &format!("view {view_guid}")).await
    }

    async fn get_circuits_by_status(
        &self,
        status: WorkStudioStatus,
        user_id: Option<UserId>,
    ) -> Result<Vec<Circuit>> {
        debug!(status = status.code(), "workstudio: fetching circuits");
        let request = self.authed(
            self.http
                .get(self.endpoint(&["circuits"]))
                .query(&[("status", status.code())]),
            user_id,
        );
        self.send_json(request, "circuits").await
    }

    async fn get_planned_units(
        &self,
        work_order: &str,
        user_id: Option<UserId>,
    ) -> Result<Vec<PlannedUnit>> {
        debug!(work_order, "workstudio: fetching planned units");
        let request = self.authed(
            self.http
                .get(self.endpoint(&["work-orders", work_order, "planned-units"])),
            user_id,
        );
        self.send_json(request, &format!("work order {work_order}"))
            .await
    }

    async fn get_current_credentials_info(&self, user_id: Option<UserId>) -> CredentialsInfo {
        match user_id.and_then(|id| self.user_credentials.get(&id).map(|c| (id, c))) {
            Some((id, credentials)) => CredentialsInfo {
                kind: CredentialKind::User,
                username: credentials.username.clone(),
                user_id: Some(id),
            },
            None => CredentialsInfo {
                kind: CredentialKind::Service,
                username: self.service.username.clone(),
                user_id: None,
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
