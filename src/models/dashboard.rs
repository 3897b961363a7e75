//! Derived dashboard structures. Never persisted; always recomputed from the
//! underlying rows.

use crate::models::site::{MeasurementKind, Status, Tower};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_USER: &str = "unknown user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_units: u32,
    pub completed_count: usize,
    pub overall_percentage: f64,
    pub progress_today: usize,
    pub measurements_today: usize,
    pub pending_alerts: usize,
    pub last_progress_date: Option<DateTime<Utc>>,
    pub last_measurement_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerRollup {
    pub tower: Tower,
    pub total_progress_entries: usize,
    pub average_percentage: f64,
    pub distinct_locations_with_progress: usize,
    pub completed_count: usize,
    pub latest_date: Option<DateTime<Utc>>,
    pub measurements_ok: usize,
    pub measurements_failure: usize,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub ok: usize,
    pub warning: usize,
    pub failure: usize,
    pub total: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Progress,
    Measurement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub id: i64,
    pub date: DateTime<Utc>,
    pub tower: Tower,
    pub description: String,
    pub user: String,
}

impl ActivityItem {
    pub fn progress(
        id: i64,
        date: DateTime<Utc>,
        tower: Tower,
        percentage: i32,
        location: &str,
        category: &str,
        user: Option<String>,
    ) -> Self {
        ActivityItem {
            kind: ActivityKind::Progress,
            id,
            date,
            tower,
            description: format!("Progress {}% at {} - {}", percentage, location, category),
            user: user.unwrap_or_else(|| UNKNOWN_USER.to_string()),
        }
    }

    pub fn measurement(
        id: i64,
        date: DateTime<Utc>,
        tower: Tower,
        kind: MeasurementKind,
        unit_id: &str,
        status: Status,
        user: Option<String>,
    ) -> Self {
        ActivityItem {
            kind: ActivityKind::Measurement,
            id,
            date,
            tower,
            description: format!("Measurement {} at {} - {}", kind, unit_id, status),
            user: user.unwrap_or_else(|| UNKNOWN_USER.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub summary: Summary,
    pub towers: Vec<TowerRollup>,
    pub measurement_status: StatusBreakdown,
    pub recent_activity: Vec<ActivityItem>,
}
