//! crates/chitchat_core/src/maintenance.rs
//!
//! The daily job that clears every user's `todays_summary` flag.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::ports::{DatabaseService, PortError, PortResult};

/// Clears `todays_summary` for every user that has it set.
pub async fn reset_todays_summary(db: &Arc<dyn DatabaseService>) -> PortResult<u64> {
    match db.clear_todays_summary_flags().await {
        Ok(count) => {
            info!("Successfully reset todays_summary for {} users", count);
            Ok(count)
        }
        Err(e) => {
            error!("Error resetting todays_summary: {}", e);
            Err(e)
        }
    }
}

/// Time of day (UTC) the reset runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    at: NaiveTime,
}

impl MaintenanceSchedule {
    pub fn daily_at(hour: u32, minute: u32) -> PortResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(|at| Self { at })
            .ok_or_else(|| PortError::Unexpected(format!("invalid schedule time {hour:02}:{minute:02}")))
    }

    /// The first run strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self {
            at: NaiveTime::from_hms_opt(7, 53, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::user;
    use crate::testing::InMemoryDb;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn reset_clears_only_flagged_users() {
        let db = Arc::new(InMemoryDb::new());
        for (name, flagged) in [("Ana", true), ("Bob", false), ("Cleo", true)] {
            let mut u = user(name);
            u.todays_summary = flagged;
            db.insert_user(u);
        }
        let port: Arc<dyn DatabaseService> = db.clone();

        assert_eq!(reset_todays_summary(&port).await.unwrap(), 2);
        assert_eq!(reset_todays_summary(&port).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_propagates_failures() {
        let db = Arc::new(InMemoryDb::new());
        db.fail_writes.store(true, Ordering::SeqCst);
        let port: Arc<dyn DatabaseService> = db;
        assert!(reset_todays_summary(&port).await.is_err());
    }

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let schedule = MaintenanceSchedule::default();
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(before),
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 53, 0).unwrap()
        );

        let exactly = Utc.with_ymd_and_hms(2024, 3, 10, 7, 53, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(exactly),
            Utc.with_ymd_and_hms(2024, 3, 11, 7, 53, 0).unwrap()
        );
    }

    #[test]
    fn rejects_impossible_times() {
        assert!(MaintenanceSchedule::daily_at(24, 0).is_err());
        assert!(MaintenanceSchedule::daily_at(23, 59).is_ok());
    }
}
