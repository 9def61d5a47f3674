use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Region, RegionId, RegionalWeeklyAggregate, Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Cards,
    Table,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Cards => "cards",
            ViewMode::Table => "table",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cards" => Some(ViewMode::Cards),
            "table" => Some(ViewMode::Table),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// One region as shown on the overview, with its latest-week stats if any exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RegionalWeeklyAggregate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardTotals {
    pub regions: usize,
    pub active_circuits: i64,
    pub total_circuits: i64,
    pub active_planners: i64,
    pub miles_planned: f64,
    pub miles_remaining: f64,
    pub total_miles: f64,
    pub percent_complete: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub view_mode: ViewMode,
    pub sort_by: String,
    pub sort_dir: SortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub panel_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_region_id: Option<RegionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_week: Option<NaiveDate>,
    pub regions: Vec<RegionRow>,
    pub totals: DashboardTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<RegionRow>,
    /// Recent weeks for the selected region, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RegionalWeeklyAggregate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub redirect_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingStatus {
    pub user_id: UserId,
    pub username: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOnboardingRequest {
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
}
