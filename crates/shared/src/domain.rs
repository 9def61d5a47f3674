use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(RegionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SudoAdmin,
    Admin,
    Planner,
    GeneralForeman,
    User,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SudoAdmin,
        Role::Admin,
        Role::Planner,
        Role::GeneralForeman,
        Role::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SudoAdmin => "sudo_admin",
            Role::Admin => "admin",
            Role::Planner => "planner",
            Role::GeneralForeman => "general_foreman",
            Role::User => "user",
        }
    }

    /// Roles allowed through admin-restricted routes.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::SudoAdmin | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == raw.trim())
            .ok_or_else(|| ParseError::UnknownRole(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: RegionId,
    pub name: String,
    pub is_active: bool,
    pub sort_order: i64,
}

/// Statistics for one region over one week, keyed by `(region_id, week_ending)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalWeeklyAggregate {
    pub region_id: RegionId,
    pub week_ending: NaiveDate,
    pub active_circuits: i64,
    pub total_circuits: i64,
    pub active_planners: i64,
    pub miles_planned: f64,
    pub miles_remaining: f64,
    pub total_miles: f64,
    pub percent_complete: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub username: String,
    pub roles: Vec<Role>,
    pub onboarding_completed: bool,
}
