use std::collections::HashMap;

use async_trait::async_trait;
use shared::{domain::UserId, status::WorkStudioStatus};

use crate::{
    Circuit, CredentialKind, CredentialsInfo, PlannedUnit, Result, ViewFilter, WorkStudioApi,
    WorkStudioError,
};

/// Fixture-backed WorkStudio used when no gateway is configured.
#[derive(Debug, Clone)]
pub struct InMemoryWorkStudio {
    healthy: bool,
    username: String,
    user_logins: HashMap<UserId, String>,
    circuits: Vec<Circuit>,
    planned_units: Vec<PlannedUnit>,
    views: HashMap<String, serde_json::Value>,
}

impl Default for InMemoryWorkStudio {
    fn default() -> Self {
        Self {
            healthy: true,
            username: "in-memory".into(),
            user_logins: HashMap::new(),
            circuits: Vec::new(),
            planned_units: Vec::new(),
            views: HashMap::new(),
        }
    }
}

impl InMemoryWorkStudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small data set for running the dashboard without a WorkStudio endpoint.
    pub fn demo() -> Self {
        let circuit = |work_order: &str,
                       title: &str,
                       status: WorkStudioStatus,
                       region: &str,
                       miles: (f64, f64)| Circuit {
            work_order: work_order.into(),
            extension: None,
            title: title.into(),
            status,
            region: Some(region.into()),
            planner: None,
            total_miles: miles.0,
            completed_miles: miles.1,
        };
        use WorkStudioStatus::*;
        Self::new()
            .with_circuit(circuit("2026-0101", "Oak Ridge 12kV", Active, "Central", (14.2, 6.1)))
            .with_circuit(circuit(
                "2026-0102",
                "Mill Creek Tap",
                QualityControl,
                "Central",
                (8.0, 8.0),
            ))
            .with_circuit(circuit("2026-0203", "Harbor Feeder 4", Rework, "Coastal", (22.7, 19.4)))
            .with_circuit(circuit("2026-0311", "Summit Line", Closed, "Mountain", (31.0, 31.0)))
            .with_planned_unit(PlannedUnit {
                work_order: "2026-0101".into(),
                unit: "SPM".into(),
                description: Some("Side trim, manual".into()),
                quantity: 42.0,
                unit_of_measure: Some("span".into()),
                station: Some("10+00".into()),
            })
    }

    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Reports `username` as the WorkStudio login of `user_id`.
    pub fn with_user_login(mut self, user_id: UserId, username: impl Into<String>) -> Self {
        self.user_logins.insert(user_id, username.into());
        self
    }

    pub fn with_circuit(mut self, circuit: Circuit) -> Self {
        self.circuits.push(circuit);
        self
    }

    pub fn with_planned_unit(mut self, unit: PlannedUnit) -> Self {
        self.planned_units.push(unit);
        self
    }

    pub fn with_view(mut self, view_guid: impl Into<String>, data: serde_json::Value) -> Self {
        self.views.insert(view_guid.into(), data);
        self
    }
}

#[async_trait]
impl WorkStudioApi for InMemoryWorkStudio {
    async fn health_check(&self) -> bool {
        self.healthy
    }

    async fn get_view_data(
        &self,
        view_guid: &str,
        filter: &ViewFilter,
        _user_id: Option<UserId>,
    ) -> Result<serde_json::Value> {
        let data = self
            .views
            .get(view_guid)
            .ok_or_else(|| WorkStudioError::NotFound(format!("view {view_guid}")))?;
        let Some(rows) = data.as_array() else {
            return Ok(data.clone());
        };
        if filter.name.is_empty() {
            return Ok(data.clone());
        }
        let matching = rows
            .iter()
            .filter(|row| {
                row.get(&filter.name)
                    .and_then(|value| value.as_str())
                    .is_some_and(|value| value == filter.value)
            })
            .cloned()
            .collect();
        Ok(serde_json::Value::Array(matching))
    }

    async fn get_circuits_by_status(
        &self,
        status: WorkStudioStatus,
        _user_id: Option<UserId>,
    ) -> Result<Vec<Circuit>> {
        Ok(self
            .circuits
            .iter()
            .filter(|circuit| circuit.status == status)
            .cloned()
            .collect())
    }

    async fn get_planned_units(
        &self,
        work_order: &str,
        _user_id: Option<UserId>,
    ) -> Result<Vec<PlannedUnit>> {
        if !self.circuits.iter().any(|c| c.work_order == work_order) {
            return Err(WorkStudioError::NotFound(format!("work order {work_order}")));
        }
        Ok(self
            .planned_units
            .iter()
            .filter(|unit| unit.work_order == work_order)
            .cloned()
            .collect())
    }

    async fn get_current_credentials_info(&self, user_id: Option<UserId>) -> CredentialsInfo {
        match user_id.and_then(|id| self.user_logins.get(&id).map(|name| (id, name))) {
            Some((id, username)) => CredentialsInfo {
                kind: CredentialKind::User,
                username: username.clone(),
                user_id: Some(id),
            },
            None => CredentialsInfo {
                kind: CredentialKind::Service,
                username: self.username.clone(),
                user_id: None,
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
