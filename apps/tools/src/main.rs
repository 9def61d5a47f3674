use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use clap::{ArgAction, Parser, Subcommand};
use server_api::auth::hash_password;
use shared::domain::{RegionalWeeklyAggregate, Role};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/dashboard.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a user with a temporary password. The user is sent through
    /// onboarding on first login unless `--onboarded` is given.
    CreateUser {
        username: String,
        password: String,
        #[arg(long = "role")]
        roles: Vec<Role>,
        #[arg(long)]
        onboarded: bool,
    },
    GrantRole {
        username: String,
        role: Role,
    },
    /// Sends a user back through onboarding.
    ResetOnboarding {
        username: String,
    },
    CreateRegion {
        name: String,
        #[arg(long, default_value_t = 0)]
        sort_order: i64,
    },
    SetRegionActive {
        name: String,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
    RecordWeek {
        region: String,
        week_ending: NaiveDate,
        #[arg(long, default_value_t = 0)]
        active_circuits: i64,
        #[arg(long, default_value_t = 0)]
        total_circuits: i64,
        #[arg(long, default_value_t = 0)]
        active_planners: i64,
        #[arg(long, default_value_t = 0.0)]
        miles_planned: f64,
        #[arg(long, default_value_t = 0.0)]
        total_miles: f64,
    },
    /// Loads a handful of regions with a few weeks of statistics.
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateUser {
            username,
            password,
            roles,
            onboarded,
        } => {
            let user_id = storage
                .create_user(&username, &hash_password(&password)?)
                .await?;
            for role in roles {
                storage.assign_role(user_id, role).await?;
            }
            if onboarded {
                storage.complete_onboarding(user_id, Utc::now()).await?;
            }
            println!("created user_id={}", user_id.0);
        }
        Command::GrantRole { username, role } => {
            let user = storage
                .find_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow!("no user named {username}"))?;
            storage.assign_role(user.user_id, role).await?;
            println!("granted {role} to user_id={}", user.user_id.0);
        }
        Command::ResetOnboarding { username } => {
            let user = storage
                .find_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow!("no user named {username}"))?;
            storage.reset_onboarding(user.user_id).await?;
            println!("reset onboarding for user_id={}", user.user_id.0);
        }
        Command::CreateRegion { name, sort_order } => {
            let region_id = storage.create_region(&name, sort_order).await?;
            println!("created region_id={}", region_id.0);
        }
        Command::SetRegionActive { name, active } => {
            let region = find_region(&storage, &name).await?;
            storage.set_region_active(region.region_id, active).await?;
            println!("region {} active={active}", region.name);
        }
        Command::RecordWeek {
            region,
            week_ending,
            active_circuits,
            total_circuits,
            active_planners,
            miles_planned,
            total_miles,
        } => {
            let region = find_region(&storage, &region).await?;
            storage
                .upsert_weekly_aggregate(&weekly_aggregate(
                    region.region_id,
                    week_ending,
                    (active_circuits, total_circuits, active_planners),
                    miles_planned,
                    total_miles,
                ))
                .await?;
            println!("recorded week {week_ending} for {}", region.name);
        }
        Command::SeedDemo => seed_demo(&storage).await?,
    }

    Ok(())
}

async fn find_region(storage: &Storage, name: &str) -> Result<shared::domain::Region> {
    storage
        .find_region_by_name(name)
        .await?
        .ok_or_else(|| anyhow!("no region named {name}"))
}

fn weekly_aggregate(
    region_id: shared::domain::RegionId,
    week_ending: NaiveDate,
    (active_circuits, total_circuits, active_planners): (i64, i64, i64),
    miles_planned: f64,
    total_miles: f64,
) -> RegionalWeeklyAggregate {
    let percent_complete = if total_miles > 0.0 {
        miles_planned / total_miles * 100.0
    } else {
        0.0
    };
    RegionalWeeklyAggregate {
        region_id,
        week_ending,
        active_circuits,
        total_circuits,
        active_planners,
        miles_planned,
        miles_remaining: (total_miles - miles_planned).max(0.0),
        total_miles,
        percent_complete,
    }
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let today = Utc::now().date_naive();
    let back_to_saturday = (today.weekday().num_days_from_monday() + 7
        - Weekday::Sat.num_days_from_monday())
        % 7;
    let last_saturday = today - Duration::days(i64::from(back_to_saturday));

    for (order, (name, total_miles, circuits)) in [
        ("Central", 420.0, 18),
        ("Coastal", 310.0, 12),
        ("Mountain", 265.0, 9),
        ("Valley", 180.0, 7),
    ]
    .into_iter()
    .enumerate()
    {
        let region_id = match storage.find_region_by_name(name).await? {
            Some(region) => region.region_id,
            None => storage.create_region(name, order as i64 + 1).await?,
        };
        for weeks_ago in (0..4i64).rev() {
            let week_ending = last_saturday - Duration::weeks(weeks_ago);
            let progress = (4 - weeks_ago) as f64 / 5.0;
            storage
                .upsert_weekly_aggregate(&weekly_aggregate(
                    region_id,
                    week_ending,
                    (circuits / 2, circuits, 2 + order as i64),
                    (total_miles * progress).round(),
                    total_miles,
                ))
                .await?;
        }
    }
    println!("seeded demo regions through week ending {last_saturday}");
    Ok(())
}
