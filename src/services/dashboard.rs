use crate::aggregator::{measurement_status_breakdown, recent_activity, rollup_by_tower, summarize};
use crate::config::SiteConfig;
use crate::models::dashboard::{DashboardData, StatusBreakdown, Summary, TowerRollup};
use crate::services::{measurements, progress};
use chrono::NaiveDate;
use diesel::PgConnection;
use log::info;

/// Items taken from each feed before merging.
const ACTIVITY_PER_SOURCE: i64 = 5;
const ACTIVITY_LIMIT: usize = 10;

pub fn summary(conn: &mut PgConnection, site: &SiteConfig, today: NaiveDate) -> Result<Summary, String> {
    let progress = progress::load_records(conn, site)?;
    let measurements = measurements::load_records(conn, site)?;
    Ok(summarize(&progress, &measurements, site.total_units, today))
}

pub fn tower_progress(conn: &mut PgConnection, site: &SiteConfig) -> Result<Vec<TowerRollup>, String> {
    let progress = progress::load_records(conn, site)?;
    let measurements = measurements::load_records(conn, site)?;
    Ok(rollup_by_tower(&site.towers, &progress, &measurements))
}

pub fn status_breakdown(conn: &mut PgConnection, site: &SiteConfig) -> Result<StatusBreakdown, String> {
    let measurements = measurements::load_records(conn, site)?;
    Ok(measurement_status_breakdown(&measurements))
}

/// Everything the dashboard screen shows, from a single load of each table.
pub fn dashboard_data(conn: &mut PgConnection, site: &SiteConfig, today: NaiveDate) -> Result<DashboardData, String> {
    let progress = progress::load_records(conn, site)?;
    let measurements = measurements::load_records(conn, site)?;
    let activity = recent_activity(
        progress::recent_activity(conn, site, ACTIVITY_PER_SOURCE)?,
        measurements::recent_activity(conn, site, ACTIVITY_PER_SOURCE)?,
        ACTIVITY_LIMIT,
    );

    let data = DashboardData {
        summary: summarize(&progress, &measurements, site.total_units, today),
        towers: rollup_by_tower(&site.towers, &progress, &measurements),
        measurement_status: measurement_status_breakdown(&measurements),
        recent_activity: activity,
    };
    info!(
        "Dashboard: {} progress entries, {} measurements, overall {}%",
        progress.len(),
        measurements.len(),
        data.summary.overall_percentage
    );
    Ok(data)
}
