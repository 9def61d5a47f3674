//! Assessments overview: view state and the region views derived from it.
//!
//! View mode, sort column, direction and search live in the URL query so a
//! reload reproduces the same view. The side panel selection is transient.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Deserialize;
use shared::{
    domain::{Region, RegionId, RegionalWeeklyAggregate},
    error::ApiError,
    protocol::{DashboardTotals, DashboardView, RegionRow, SortDirection, ViewMode},
    stats::StatField,
};
use tracing::debug;

use crate::{internal, ApiContext};

/// Weeks of history returned for the region open in the side panel.
pub const PANEL_HISTORY_WEEKS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Name,
    Stat(StatField),
}

impl SortColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::Name => "name",
            SortColumn::Stat(field) => field.as_str(),
        }
    }

    /// Only `name` and the allow-listed stat fields are sortable.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "name" {
            return Some(SortColumn::Name);
        }
        raw.parse::<StatField>().ok().map(SortColumn::Stat)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub view: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub search: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardState {
    pub view_mode: ViewMode,
    pub sort_by: SortColumn,
    pub sort_dir: SortDirection,
    pub search: Option<String>,
    pub panel_open: bool,
    pub selected_region_id: Option<RegionId>,
}

impl DashboardState {
    /// Unknown or malformed query values fall back to their defaults.
    pub fn from_query(query: &DashboardQuery) -> Self {
        let mut state = Self {
            view_mode: query
                .view
                .as_deref()
                .and_then(ViewMode::parse)
                .unwrap_or_default(),
            sort_by: query
                .sort
                .as_deref()
                .and_then(SortColumn::parse)
                .unwrap_or_default(),
            sort_dir: query
                .dir
                .as_deref()
                .and_then(SortDirection::parse)
                .unwrap_or_default(),
            ..Self::default()
        };
        state.set_search(query.search.as_deref().unwrap_or_default());
        if let Some(region) = query
            .region
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        {
            state.open_panel(RegionId(region));
        }
        state
    }

    /// The persisted part of the state as a URL query string.
    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("view", self.view_mode.as_str());
        query.append_pair("sort", self.sort_by.as_str());
        query.append_pair("dir", self.sort_dir.as_str());
        if let Some(search) = &self.search {
            query.append_pair("search", search);
        }
        query.finish()
    }

    pub fn sort(&mut self, column: SortColumn) {
        if self.sort_by == column {
            self.sort_dir = self.sort_dir.toggled();
        } else {
            self.sort_by = column;
            self.sort_dir = SortDirection::Asc;
        }
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    pub fn set_search(&mut self, search: &str) {
        let search = search.trim();
        self.search = (!search.is_empty()).then(|| search.to_string());
    }

    pub fn open_panel(&mut self, region_id: RegionId) {
        self.selected_region_id = Some(region_id);
        self.panel_open = true;
    }

    pub fn close_panel(&mut self) {
        self.selected_region_id = None;
        self.panel_open = false;
    }

    /// Active regions matching the search, ordered per the current sort.
    ///
    /// Regions without a latest-week aggregate sort as if every stat were
    /// zero. Equal keys keep display order (`sort_order`, then name).
    pub fn sorted_regions(
        &self,
        regions: &[Region],
        latest: &[RegionalWeeklyAggregate],
    ) -> Vec<RegionRow> {
        let needle = self.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<RegionRow> = regions
            .iter()
            .filter(|region| region.is_active)
            .filter(|region| {
                needle
                    .as_deref()
                    .map_or(true, |needle| region.name.to_lowercase().contains(needle))
            })
            .map(|region| RegionRow {
                region: region.clone(),
                stats: latest
                    .iter()
                    .find(|agg| agg.region_id == region.region_id)
                    .cloned(),
            })
            .collect();

        rows.sort_by(display_order);
        let dir = self.sort_dir;
        match self.sort_by {
            SortColumn::Name => rows.sort_by(|a, b| {
                directed(
                    dir,
                    a.region
                        .name
                        .to_lowercase()
                        .cmp(&b.region.name.to_lowercase()),
                )
            }),
            SortColumn::Stat(field) => rows.sort_by(|a, b| {
                directed(dir, stat_value(a, field).total_cmp(&stat_value(b, field)))
            }),
        }
        rows
    }

    pub fn selected_stats<'a>(&self, rows: &'a [RegionRow]) -> Option<&'a RegionRow> {
        let selected = self.selected_region_id?;
        rows.iter().find(|row| row.region.region_id == selected)
    }
}

fn display_order(a: &RegionRow, b: &RegionRow) -> Ordering {
    a.region
        .sort_order
        .cmp(&b.region.sort_order)
        .then_with(|| a.region.name.to_lowercase().cmp(&b.region.name.to_lowercase()))
}

fn directed(dir: SortDirection, ordering: Ordering) -> Ordering {
    match dir {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn stat_value(row: &RegionRow, field: StatField) -> f64 {
    row.stats.as_ref().map_or(0.0, |agg| field.value(agg))
}

pub fn totals(rows: &[RegionRow]) -> DashboardTotals {
    let mut totals = DashboardTotals {
        regions: rows.len(),
        ..DashboardTotals::default()
    };
    for agg in rows.iter().filter_map(|row| row.stats.as_ref()) {
        totals.active_circuits += agg.active_circuits;
        totals.total_circuits += agg.total_circuits;
        totals.active_planners += agg.active_planners;
        totals.miles_planned += agg.miles_planned;
        totals.miles_remaining += agg.miles_remaining;
        totals.total_miles += agg.total_miles;
    }
    if totals.total_miles > 0.0 {
        totals.percent_complete =
            (totals.miles_planned / totals.total_miles * 1000.0).round() / 10.0;
    }
    totals
}

pub fn latest_week(rows: &[RegionRow]) -> Option<NaiveDate> {
    rows.iter()
        .filter_map(|row| row.stats.as_ref().map(|agg| agg.week_ending))
        .max()
}

/// Builds the overview for `state` from the latest stored statistics.
pub async fn load_overview(
    ctx: &ApiContext,
    state: &DashboardState,
) -> Result<DashboardView, ApiError> {
    let regions = ctx.storage.list_regions(true).await.map_err(internal)?;
    let latest = ctx
        .storage
        .latest_weekly_aggregates()
        .await
        .map_err(internal)?;
    let rows = state.sorted_regions(&regions, &latest);

    let selected = state.selected_stats(&rows).cloned();
    let history = match (&selected, state.panel_open) {
        (Some(row), true) => ctx
            .storage
            .weekly_history(row.region.region_id, PANEL_HISTORY_WEEKS)
            .await
            .map_err(internal)?,
        _ => Vec::new(),
    };
    debug!(
        regions = rows.len(),
        sort_by = state.sort_by.as_str(),
        sort_dir = state.sort_dir.as_str(),
        "built assessments overview"
    );

    Ok(DashboardView {
        view_mode: state.view_mode,
        sort_by: state.sort_by.as_str().to_string(),
        sort_dir: state.sort_dir,
        search: state.search.clone(),
        panel_open: state.panel_open,
        selected_region_id: state.selected_region_id,
        latest_week: latest_week(&rows),
        totals: totals(&rows),
        regions: rows,
        selected,
        history,
    })
}

#[cfg(test)]
#[path = "tests/dashboard_tests.rs"]
mod tests;
