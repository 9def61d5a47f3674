use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{domain::RegionalWeeklyAggregate, error::ParseError};

/// Numeric columns of a weekly aggregate that the dashboard may sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    ActiveCircuits,
    TotalCircuits,
    ActivePlanners,
    MilesPlanned,
    MilesRemaining,
    TotalMiles,
    PercentComplete,
}

impl StatField {
    pub const ALL: [StatField; 7] = [
        StatField::ActiveCircuits,
        StatField::TotalCircuits,
        StatField::ActivePlanners,
        StatField::MilesPlanned,
        StatField::MilesRemaining,
        StatField::TotalMiles,
        StatField::PercentComplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatField::ActiveCircuits => "active_circuits",
            StatField::TotalCircuits => "total_circuits",
            StatField::ActivePlanners => "active_planners",
            StatField::MilesPlanned => "miles_planned",
            StatField::MilesRemaining => "miles_remaining",
            StatField::TotalMiles => "total_miles",
            StatField::PercentComplete => "percent_complete",
        }
    }

    pub fn value(self, aggregate: &RegionalWeeklyAggregate) -> f64 {
        match self {
            StatField::ActiveCircuits => aggregate.active_circuits as f64,
            StatField::TotalCircuits => aggregate.total_circuits as f64,
            StatField::ActivePlanners => aggregate.active_planners as f64,
            StatField::MilesPlanned => aggregate.miles_planned,
            StatField::MilesRemaining => aggregate.miles_remaining,
            StatField::TotalMiles => aggregate.total_miles,
            StatField::PercentComplete => aggregate.percent_complete,
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatField {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        StatField::ALL
            .into_iter()
            .find(|field| field.as_str() == raw)
            .ok_or_else(|| ParseError::UnknownStatField(raw.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/stats_tests.rs"]
mod tests;
