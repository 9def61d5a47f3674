use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Region, RegionId, RegionalWeeklyAggregate, Role, UserId, UserSummary};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub onboarding_completed_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    pub fn onboarding_completed(&self) -> bool {
        self.onboarding_completed_at.is_some()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id,
            username: self.username.clone(),
            roles: self.roles.clone(),
            onboarding_completed: self.onboarding_completed(),
        }
    }
}

const USER_SELECT: &str = "SELECT u.id, u.username, u.password_hash, u.onboarding_completed_at,
        COALESCE(group_concat(r.role, ','), '')
     FROM users u
     LEFT JOIN user_roles r ON r.user_id = u.id";

const AGGREGATE_COLUMNS: &str = "a.region_id, a.week_ending, a.active_circuits, a.total_circuits,
        a.active_planners, a.miles_planned, a.miles_remaining, a.total_miles, a.percent_complete";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, password_hash) VALUES (?, ?) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create user '{username}'"))?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn load_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("{USER_SELECT} WHERE u.id = ? GROUP BY u.id"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!(
            "{USER_SELECT} WHERE lower(u.username) = lower(?) GROUP BY u.id"
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn list_users(&self) -> Result<Vec<StoredUser>> {
        let rows = sqlx::query(&format!(
            "{USER_SELECT} GROUP BY u.id ORDER BY lower(u.username) ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn assign_role(&self, user_id: UserId, role: Role) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role) VALUES (?, ?)
             ON CONFLICT(user_id, role) DO NOTHING",
        )
        .bind(user_id.0)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_role(&self, user_id: UserId, role: Role) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(user_id.0)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users_with_role(&self, role: Role) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role = ?")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn complete_onboarding(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET onboarding_completed_at = COALESCE(onboarding_completed_at, ?) WHERE id = ?",
        )
        .bind(at)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_onboarding(&self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET onboarding_completed_at = NULL WHERE id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_region(&self, name: &str, sort_order: i64) -> Result<RegionId> {
        let rec = sqlx::query("INSERT INTO regions (name, sort_order) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(sort_order)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to create region '{name}'"))?;
        Ok(RegionId(rec.get::<i64, _>(0)))
    }

    pub async fn set_region_active(&self, region_id: RegionId, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE regions SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(region_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_region_by_name(&self, name: &str) -> Result<Option<Region>> {
        let row = sqlx::query(
            "SELECT id, name, is_active, sort_order FROM regions WHERE lower(name) = lower(?)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| region_from_row(&r)))
    }

    /// Regions in display order (`sort_order`, then name).
    pub async fn list_regions(&self, active_only: bool) -> Result<Vec<Region>> {
        let rows = sqlx::query(
            "SELECT id, name, is_active, sort_order
             FROM regions
             WHERE (? = 0 OR is_active = 1)
             ORDER BY sort_order ASC, lower(name) ASC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(region_from_row).collect())
    }

    pub async fn upsert_weekly_aggregate(&self, aggregate: &RegionalWeeklyAggregate) -> Result<()> {
        sqlx::query(
            "INSERT INTO regional_weekly_aggregates
                (region_id, week_ending, active_circuits, total_circuits, active_planners,
                 miles_planned, miles_remaining, total_miles, percent_complete)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(region_id, week_ending) DO UPDATE SET
                active_circuits=excluded.active_circuits,
                total_circuits=excluded.total_circuits,
                active_planners=excluded.active_planners,
                miles_planned=excluded.miles_planned,
                miles_remaining=excluded.miles_remaining,
                total_miles=excluded.total_miles,
                percent_complete=excluded.percent_complete",
        )
        .bind(aggregate.region_id.0)
        .bind(aggregate.week_ending)
        .bind(aggregate.active_circuits)
        .bind(aggregate.total_circuits)
        .bind(aggregate.active_planners)
        .bind(aggregate.miles_planned)
        .bind(aggregate.miles_remaining)
        .bind(aggregate.total_miles)
        .bind(aggregate.percent_complete)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to store aggregate for region {} week {}",
                aggregate.region_id.0, aggregate.week_ending
            )
        })?;
        Ok(())
    }

    /// The most recent week of statistics for every region that has any.
    /// `(region_id, week_ending)` is unique, so each region yields at most one row.
    pub async fn latest_weekly_aggregates(&self) -> Result<Vec<RegionalWeeklyAggregate>> {
        let rows = sqlx::query(&format!(
            "SELECT {AGGREGATE_COLUMNS}
             FROM regional_weekly_aggregates a
             INNER JOIN (
                 SELECT region_id, MAX(week_ending) AS week_ending
                 FROM regional_weekly_aggregates
                 GROUP BY region_id
             ) latest ON latest.region_id = a.region_id AND latest.week_ending = a.week_ending
             ORDER BY a.region_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(aggregate_from_row).collect())
    }

    pub async fn weekly_history(
        &self,
        region_id: RegionId,
        limit: u32,
    ) -> Result<Vec<RegionalWeeklyAggregate>> {
        let rows = sqlx::query(&format!(
            "SELECT {AGGREGATE_COLUMNS}
             FROM regional_weekly_aggregates a
             WHERE a.region_id = ?
             ORDER BY a.week_ending DESC
             LIMIT ?"
        ))
        .bind(region_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(aggregate_from_row).collect())
    }
}

fn user_from_row(row: &SqliteRow) -> StoredUser {
    let roles = row
        .get::<String, _>(4)
        .split(',')
        .filter_map(|raw| raw.parse::<Role>().ok())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    StoredUser {
        user_id: UserId(row.get::<i64, _>(0)),
        username: row.get::<String, _>(1),
        password_hash: row.get::<String, _>(2),
        roles,
        onboarding_completed_at: row.get::<Option<DateTime<Utc>>, _>(3),
    }
}

fn region_from_row(row: &SqliteRow) -> Region {
    Region {
        region_id: RegionId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        is_active: row.get::<bool, _>(2),
        sort_order: row.get::<i64, _>(3),
    }
}

fn aggregate_from_row(row: &SqliteRow) -> RegionalWeeklyAggregate {
    RegionalWeeklyAggregate {
        region_id: RegionId(row.get::<i64, _>(0)),
        week_ending: row.get::<NaiveDate, _>(1),
        active_circuits: row.get::<i64, _>(2),
        total_circuits: row.get::<i64, _>(3),
        active_planners: row.get::<i64, _>(4),
        miles_planned: row.get::<f64, _>(5),
        miles_remaining: row.get::<f64, _>(6),
        total_miles: row.get::<f64, _>(7),
        percent_complete: row.get::<f64, _>(8),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
