//! services/api/src/bin/maintenance.rs
//!
//! Runs the daily `todays_summary` reset. Sleeps until the configured time of
//! day (UTC), runs the job, and retries failed runs with a growing delay.
//! Pass `--once` to run immediately and exit.

use api_lib::{adapters::DbAdapter, config::Config, error::ApiError};
use chitchat_core::maintenance::{reset_todays_summary, MaintenanceSchedule};
use chitchat_core::ports::{DatabaseService, PortResult};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RETRY_BASE_DELAY: Duration = Duration::from_secs(30);

async fn run_with_retries(db: &Arc<dyn DatabaseService>, max_attempts: u32) -> PortResult<u64> {
    let mut attempt = 1;
    loop {
        match reset_todays_summary(db).await {
            Ok(count) => return Ok(count),
            Err(e) if attempt < max_attempts => {
                let delay = RETRY_BASE_DELAY * attempt;
                warn!(
                    "Reset attempt {}/{} failed: {}. Retrying in {:?}.",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await?;
    let db: Arc<dyn DatabaseService> = Arc::new(DbAdapter::new(db_pool));

    if std::env::args().any(|arg| arg == "--once") {
        run_with_retries(&db, config.maintenance_max_attempts).await?;
        return Ok(());
    }

    let schedule = MaintenanceSchedule::daily_at(config.maintenance_hour, config.maintenance_minute)?;
    loop {
        let now = Utc::now();
        let next = schedule.next_run_after(now);
        info!("Next todays_summary reset at {}", next);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        if let Err(e) = run_with_retries(&db, config.maintenance_max_attempts).await {
            error!("Giving up on today's reset after {} attempts: {}", config.maintenance_max_attempts, e);
        }
    }
}
