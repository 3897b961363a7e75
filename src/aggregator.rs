//! Dashboard aggregation over already-loaded progress and measurement records.
//!
//! Every function here is pure. Statuses are read as persisted; nothing is
//! reclassified. All ratios guard their denominators and yield 0 instead.

use crate::models::dashboard::{ActivityItem, StatusBreakdown, Summary, TowerRollup};
use crate::models::site::{MeasurementRecord, ProgressRecord, Status, Tower};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Round to two decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / total * 100`, rounded; 0 when `total` is 0.
pub fn percentage_of(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn latest(dates: impl Iterator<Item = DateTime<Utc>>) -> Option<DateTime<Utc>> {
    dates.max()
}

fn on_day(date: DateTime<Utc>, day: NaiveDate) -> bool {
    date.date_naive() == day
}

pub fn summarize(
    progress: &[ProgressRecord],
    measurements: &[MeasurementRecord],
    total_units: u32,
    today: NaiveDate,
) -> Summary {
    let completed_count = progress.iter().filter(|p| p.is_complete()).count();

    Summary {
        total_units,
        completed_count,
        overall_percentage: percentage_of(completed_count, total_units as usize),
        progress_today: progress.iter().filter(|p| on_day(p.date, today)).count(),
        measurements_today: measurements.iter().filter(|m| on_day(m.date, today)).count(),
        pending_alerts: measurements.iter().filter(|m| m.status == Status::Failure).count(),
        last_progress_date: latest(progress.iter().map(|p| p.date)),
        last_measurement_date: latest(measurements.iter().map(|m| m.date)),
    }
}

/// One rollup per configured tower, in configuration order, including towers
/// without any activity.
pub fn rollup_by_tower(
    towers: &[Tower],
    progress: &[ProgressRecord],
    measurements: &[MeasurementRecord],
) -> Vec<TowerRollup> {
    towers
        .iter()
        .map(|&tower| {
            let entries: Vec<&ProgressRecord> = progress.iter().filter(|p| p.tower == tower).collect();
            let total = entries.len();
            let sum: u64 = entries.iter().map(|p| u64::from(p.percentage)).sum();
            let average_percentage = if total == 0 {
                0.0
            } else {
                round2(sum as f64 / total as f64)
            };
            let locations: BTreeSet<&str> = entries.iter().map(|p| p.location.as_str()).collect();

            let tower_statuses = measurements.iter().filter(|m| m.tower == tower).map(|m| m.status);
            let (mut ok, mut failure) = (0, 0);
            for status in tower_statuses {
                match status {
                    Status::Ok => ok += 1,
                    Status::Failure => failure += 1,
                    Status::Warning => {}
                }
            }

            TowerRollup {
                tower,
                total_progress_entries: total,
                average_percentage,
                distinct_locations_with_progress: locations.len(),
                completed_count: entries.iter().filter(|p| p.is_complete()).count(),
                latest_date: latest(entries.iter().map(|p| p.date)),
                measurements_ok: ok,
                measurements_failure: failure,
            }
        })
        .collect()
}

pub fn measurement_status_breakdown(measurements: &[MeasurementRecord]) -> StatusBreakdown {
    let mut breakdown = StatusBreakdown {
        total: measurements.len(),
        ..Default::default()
    };
    for m in measurements {
        match m.status {
            Status::Ok => breakdown.ok += 1,
            Status::Warning => breakdown.warning += 1,
            Status::Failure => breakdown.failure += 1,
        }
    }
    breakdown
}

/// Merge both activity feeds, newest first, keeping at most `limit` items.
pub fn recent_activity(
    progress: Vec<ActivityItem>,
    measurements: Vec<ActivityItem>,
    limit: usize,
) -> Vec<ActivityItem> {
    let mut items: Vec<ActivityItem> = progress.into_iter().chain(measurements).collect();
    items.sort_by(|a, b| b.date.cmp(&a.date));
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dashboard::ActivityKind;
    use crate::models::site::MeasurementKind;
    use chrono::TimeZone;

    fn tower(c: char) -> Tower {
        Tower::new(c).expect("valid tower letter")
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn progress(t: char, percentage: u8, location: &str, date: DateTime<Utc>) -> ProgressRecord {
        ProgressRecord {
            tower: tower(t),
            percentage,
            location: location.to_string(),
            date,
        }
    }

    fn measurement(t: char, status: Status, date: DateTime<Utc>) -> MeasurementRecord {
        MeasurementRecord {
            tower: tower(t),
            status,
            date,
        }
    }

    #[test]
    fn empty_site_summary_is_all_zero() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let summary = summarize(&[], &[], 1247, today);
        assert_eq!(summary.total_units, 1247);
        assert_eq!(summary.completed_count, 0);
        assert_eq!(summary.overall_percentage, 0.0);
        assert_eq!(summary.pending_alerts, 0);
        assert_eq!(summary.progress_today, 0);
        assert_eq!(summary.last_progress_date, None);
        assert_eq!(summary.last_measurement_date, None);
    }

    #[test]
    fn zero_units_yield_zero_percentage() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let records = [progress('A', 100, "A0101", at(10, 9))];
        assert_eq!(summarize(&records, &[], 0, today).overall_percentage, 0.0);
    }

    #[test]
    fn summary_counts_today_alerts_and_latest_dates() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let records = [
            progress('A', 100, "A0101", at(10, 0)),
            progress('A', 40, "A0102", at(10, 23)),
            progress('B', 100, "B0307", at(9, 12)),
        ];
        let readings = [
            measurement('A', Status::Failure, at(10, 8)),
            measurement('B', Status::Ok, at(11, 1)),
            measurement('B', Status::Failure, at(2, 1)),
        ];
        let summary = summarize(&records, &readings, 3, today);
        assert_eq!(summary.completed_count, 2);
        assert_eq!(summary.overall_percentage, 66.67);
        assert_eq!(summary.progress_today, 2);
        assert_eq!(summary.measurements_today, 1);
        assert_eq!(summary.pending_alerts, 2);
        assert_eq!(summary.last_progress_date, Some(at(10, 23)));
        assert_eq!(summary.last_measurement_date, Some(at(11, 1)));
    }

    #[test]
    fn rollup_includes_idle_towers_in_configured_order() {
        let towers = [tower('A'), tower('B')];
        let records = [progress('A', 100, "A101", at(1, 10))];
        let rollups = rollup_by_tower(&towers, &records, &[]);

        assert_eq!(rollups.len(), 2);
        let a = &rollups[0];
        assert_eq!(a.tower, tower('A'));
        assert_eq!(a.completed_count, 1);
        assert_eq!(a.average_percentage, 100.0);
        assert_eq!(a.distinct_locations_with_progress, 1);
        assert_eq!(a.latest_date, Some(at(1, 10)));

        let b = &rollups[1];
        assert_eq!(b.tower, tower('B'));
        assert_eq!(b.total_progress_entries, 0);
        assert_eq!(b.average_percentage, 0.0);
        assert_eq!(b.distinct_locations_with_progress, 0);
        assert_eq!(b.completed_count, 0);
        assert_eq!(b.latest_date, None);
        assert_eq!(b.measurements_ok, 0);
        assert_eq!(b.measurements_failure, 0);
    }

    #[test]
    fn rollup_averages_and_counts_per_tower() {
        let towers = [tower('C'), tower('A')];
        let records = [
            progress('A', 10, "A0101", at(1, 10)),
            progress('A', 25, "A0101", at(2, 10)),
            progress('A', 30, "A0102", at(3, 10)),
            progress('C', 100, "C0207", at(4, 10)),
        ];
        let readings = [
            measurement('A', Status::Ok, at(1, 1)),
            measurement('A', Status::Warning, at(1, 2)),
            measurement('A', Status::Failure, at(1, 3)),
            measurement('A', Status::Ok, at(1, 4)),
            measurement('D', Status::Failure, at(1, 5)),
        ];
        let rollups = rollup_by_tower(&towers, &records, &readings);
        assert_eq!(rollups[0].tower, tower('C'));
        assert_eq!(rollups[1].tower, tower('A'));

        let a = &rollups[1];
        assert_eq!(a.total_progress_entries, 3);
        assert_eq!(a.average_percentage, 21.67);
        assert_eq!(a.distinct_locations_with_progress, 2);
        assert_eq!(a.completed_count, 0);
        assert_eq!(a.latest_date, Some(at(3, 10)));
        assert_eq!(a.measurements_ok, 2);
        assert_eq!(a.measurements_failure, 1);
        assert_eq!(rollups[0].measurements_failure, 0);
    }

    #[test]
    fn breakdown_partitions_all_records() {
        let statuses = [Status::Ok, Status::Warning, Status::Failure];
        let readings: Vec<MeasurementRecord> = (0..23)
            .map(|i| measurement('E', statuses[(i * 7) % 3], at(5, i as u32 % 24)))
            .collect();
        for n in 0..=readings.len() {
            let b = measurement_status_breakdown(&readings[..n]);
            assert_eq!(b.ok + b.warning + b.failure, b.total);
            assert_eq!(b.total, n);
        }
        assert_eq!(measurement_status_breakdown(&[]), StatusBreakdown::default());
    }

    #[test]
    fn rounding_is_stable_when_repeated() {
        for v in [0.0, 1.005, 2.675, 33.333333, 66.666666, 99.995] {
            assert_eq!(round2(round2(v)), round2(v));
        }
        assert_eq!(percentage_of(1, 3), 33.33);
        assert_eq!(percentage_of(5, 0), 0.0);
    }

    #[test]
    fn recent_activity_merges_newest_first() {
        let p = vec![
            ActivityItem::progress(1, at(3, 8), tower('A'), 50, "A0101", "Cableado", Some("Ana".into())),
            ActivityItem::progress(2, at(1, 8), tower('B'), 100, "B0101", "Canalización", None),
        ];
        let m = vec![ActivityItem::measurement(
            7,
            at(2, 8),
            tower('A'),
            MeasurementKind::Coaxial,
            "A0101",
            Status::Warning,
            Some("Luis".into()),
        )];
        let items = recent_activity(p, m, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].kind, ActivityKind::Measurement);
        assert_eq!(items[1].description, "Measurement coaxial at A0101 - WARNING");
        assert_eq!(items[0].description, "Progress 50% at A0101 - Cableado");

        let all = recent_activity(
            vec![ActivityItem::progress(3, at(1, 1), tower('C'), 5, "C0113", "Sondeo", None)],
            vec![],
            10,
        );
        assert_eq!(all[0].user, crate::models::dashboard::UNKNOWN_USER);
    }
}
