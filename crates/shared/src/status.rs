//! Work-order status codes used by WorkStudio.
//!
//! The codes are fixed wire values; everything else here is presentation
//! metadata consumed by the dashboard.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkStudioStatus {
    #[serde(rename = "ACTIV")]
    Active,
    #[serde(rename = "QC")]
    QualityControl,
    #[serde(rename = "REWRK")]
    Rework,
    #[serde(rename = "CLOSE")]
    Closed,
}

impl WorkStudioStatus {
    pub fn all() -> [WorkStudioStatus; 4] {
        [
            WorkStudioStatus::Active,
            WorkStudioStatus::QualityControl,
            WorkStudioStatus::Rework,
            WorkStudioStatus::Closed,
        ]
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|status| status.code().eq_ignore_ascii_case(code.trim()))
    }

    pub fn code(self) -> &'static str {
        match self {
            WorkStudioStatus::Active => "ACTIV",
            WorkStudioStatus::QualityControl => "QC",
            WorkStudioStatus::Rework => "REWRK",
            WorkStudioStatus::Closed => "CLOSE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkStudioStatus::Active => "Active",
            WorkStudioStatus::QualityControl => "Quality Control",
            WorkStudioStatus::Rework => "Rework",
            WorkStudioStatus::Closed => "Closed",
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            WorkStudioStatus::Active => "badge-primary",
            WorkStudioStatus::QualityControl => "badge-warning",
            WorkStudioStatus::Rework => "badge-error",
            WorkStudioStatus::Closed => "badge-success",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            WorkStudioStatus::Active => "blue",
            WorkStudioStatus::QualityControl => "amber",
            WorkStudioStatus::Rework => "red",
            WorkStudioStatus::Closed => "green",
        }
    }

    /// Whether circuits in this status may be pulled from WorkStudio at all.
    ///
    /// Every known status is syncable; closed circuits are only pulled on
    /// request. [`Self::syncs_automatically`] is the flag that varies.
    pub fn is_syncable(self) -> bool {
        true
    }

    /// Whether the scheduled sync picks this status up without an explicit request.
    pub fn syncs_automatically(self) -> bool {
        !matches!(self, WorkStudioStatus::Closed)
    }

    pub fn auto_sync_codes() -> Vec<&'static str> {
        Self::all()
            .into_iter()
            .filter(|status| status.syncs_automatically())
            .map(WorkStudioStatus::code)
            .collect()
    }

    pub fn descriptor(self) -> StatusDescriptor {
        StatusDescriptor {
            code: self.code().to_string(),
            label: self.label().to_string(),
            badge_class: self.badge_class().to_string(),
            color: self.color().to_string(),
            is_syncable: self.is_syncable(),
            syncs_automatically: self.syncs_automatically(),
        }
    }
}

impl fmt::Display for WorkStudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WorkStudioStatus {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::from_code(raw).ok_or_else(|| ParseError::UnknownStatus(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDescriptor {
    pub code: String,
    pub label: String,
    pub badge_class: String,
    pub color: String,
    pub is_syncable: bool,
    pub syncs_automatically: bool,
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
