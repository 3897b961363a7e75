use crate::classifier::{classify, classify_reading};
use crate::config::SiteConfig;
use crate::db::models::{Measurement, MeasurementChanges, NewMeasurement};
use crate::models::dashboard::ActivityItem;
use crate::models::site::{MeasurementInput, MeasurementKind, MeasurementPatch, MeasurementRecord, Status, Tower};
use crate::schema;
use crate::services::query::{day_start, like_pattern, DEFAULT_PAGE_SIZE};
use crate::validation::{validate_measurement, ValidationError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementFilter {
    pub tower: Option<Tower>,
    pub floor: Option<i32>,
    #[serde(rename = "type")]
    pub kind: Option<MeasurementKind>,
    pub status: Option<Status>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Matched against unit id and notes
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Outcome of recomputing every stored status against the current ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReclassifyReport {
    pub scanned: usize,
    pub changed: usize,
    pub failed: Vec<ReclassifyFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReclassifyFailure {
    pub id: i64,
    pub reason: String,
}

pub fn list(conn: &mut PgConnection, site: &SiteConfig, filter: &MeasurementFilter) -> Result<Vec<Measurement>, String> {
    use schema::measurements::dsl as M;

    let mut query = M::measurements.filter(M::site_id.eq(&site.site_id)).into_boxed();

    if let Some(tower) = filter.tower {
        query = query.filter(M::tower.eq(tower.to_string()));
    }
    if let Some(floor) = filter.floor {
        query = query.filter(M::floor.eq(floor));
    }
    if let Some(kind) = filter.kind {
        query = query.filter(M::kind.eq(kind.as_str()));
    }
    if let Some(status) = filter.status {
        query = query.filter(M::status.eq(status.as_str()));
    }
    if let Some(from) = filter.from {
        query = query.filter(M::recorded_at.ge(day_start(from)));
    }
    if let Some(to) = filter.to {
        query = query.filter(M::recorded_at.lt(day_start(to) + Duration::days(1)));
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        query = query.filter(M::unit_id.ilike(pattern.clone()).or(M::notes.ilike(pattern)));
    }

    query
        .order(M::recorded_at.desc())
        .limit(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .offset(filter.offset.unwrap_or(0))
        .select(Measurement::as_select())
        .load(conn)
        .map_err(|e| format!("list measurements failed: {}", e))
}

pub fn get(conn: &mut PgConnection, site: &SiteConfig, id: i64) -> Result<Option<Measurement>, String> {
    use schema::measurements::dsl as M;

    M::measurements
        .find(id)
        .filter(M::site_id.eq(&site.site_id))
        .select(Measurement::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("fetch measurement {} failed: {}", id, e))
}

/// Validate, classify against the site's ranges and persist. The stored
/// status is never recomputed on read.
pub fn create(
    conn: &mut PgConnection,
    site: &SiteConfig,
    input: &MeasurementInput,
    user_id: Option<i64>,
) -> Result<Measurement, String> {
    use schema::measurements::dsl as M;

    let checked = validate_measurement(site, input).map_err(|e| e.to_string())?;
    let status = classify_reading(&site.ranges, &checked.reading);
    let row = NewMeasurement {
        site_id: site.site_id.clone(),
        recorded_at: input.date,
        tower: checked.tower.to_string(),
        floor: i32::from(checked.floor),
        unit_id: input.unit_id.trim().to_string(),
        kind: checked.reading.kind().as_str().to_string(),
        readings: checked.reading.values_json(),
        status: status.as_str().to_string(),
        notes: input.notes.clone(),
        user_id,
    };

    let measurement = diesel::insert_into(M::measurements)
        .values(&row)
        .returning(Measurement::as_returning())
        .get_result(conn)
        .map_err(|e| format!("insert measurement failed: {}", e))?;
    info!(
        "Measurements: created {} ({} at {} -> {})",
        measurement.id, measurement.kind, measurement.unit_id, measurement.status
    );
    Ok(measurement)
}

fn stored_input(measurement: &Measurement) -> Result<MeasurementInput, String> {
    let kind: MeasurementKind = measurement
        .kind
        .parse()
        .map_err(|e| format!("measurement {}: {}", measurement.id, e))?;
    Ok(MeasurementInput {
        date: measurement.recorded_at,
        tower: measurement.tower.clone(),
        floor: measurement.floor,
        unit_id: measurement.unit_id.clone(),
        kind,
        values: measurement.readings.clone(),
        notes: measurement.notes.clone(),
    })
}

fn apply_patch(base: MeasurementInput, patch: &MeasurementPatch) -> MeasurementInput {
    MeasurementInput {
        date: patch.date.unwrap_or(base.date),
        tower: patch.tower.clone().unwrap_or(base.tower),
        floor: patch.floor.unwrap_or(base.floor),
        unit_id: patch.unit_id.clone().unwrap_or(base.unit_id),
        kind: patch.kind.unwrap_or(base.kind),
        values: patch.values.clone().unwrap_or(base.values),
        notes: patch.notes.clone().or(base.notes),
    }
}

/// Partial update. A patch touching the type or the values re-runs the
/// classifier and replaces the stored status.
pub fn update(
    conn: &mut PgConnection,
    site: &SiteConfig,
    id: i64,
    patch: &MeasurementPatch,
) -> Result<Option<Measurement>, String> {
    use schema::measurements::dsl as M;

    if patch.is_empty() {
        return Err(ValidationError::EmptyUpdate.to_string());
    }
    let Some(existing) = get(conn, site, id)? else {
        return Ok(None);
    };
    let merged = apply_patch(stored_input(&existing)?, patch);
    let checked = validate_measurement(site, &merged).map_err(|e| e.to_string())?;

    let mut changes = MeasurementChanges {
        recorded_at: patch.date,
        tower: patch.tower.as_ref().map(|_| checked.tower.to_string()),
        floor: patch.floor,
        unit_id: patch.unit_id.as_deref().map(|s| s.trim().to_string()),
        notes: patch.notes.clone(),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    if patch.touches_reading() {
        let status = classify_reading(&site.ranges, &checked.reading);
        changes.kind = Some(checked.reading.kind().as_str().to_string());
        changes.readings = Some(checked.reading.values_json());
        changes.status = Some(status.as_str().to_string());
    }

    let updated = diesel::update(M::measurements.find(id))
        .set(&changes)
        .returning(Measurement::as_returning())
        .get_result(conn)
        .optional()
        .map_err(|e| format!("update measurement {} failed: {}", id, e))?;
    if let Some(m) = updated.as_ref() {
        info!("Measurements: updated {} (status {})", id, m.status);
    }
    Ok(updated)
}

/// Hard delete. Returns whether a row was removed.
pub fn delete(conn: &mut PgConnection, site: &SiteConfig, id: i64) -> Result<bool, String> {
    use schema::measurements::dsl as M;

    let count = diesel::delete(M::measurements.find(id).filter(M::site_id.eq(&site.site_id)))
        .execute(conn)
        .map_err(|e| format!("delete measurement {} failed: {}", id, e))?;
    if count > 0 {
        info!("Measurements: deleted {}", id);
    }
    Ok(count > 0)
}

/// Stored status a row would get under `site.ranges`, from its raw columns.
fn recompute_status(site: &SiteConfig, kind: &str, readings: &serde_json::Value) -> Result<Status, String> {
    let values = readings
        .as_object()
        .ok_or_else(|| format!("readings is not an object: {}", readings))?;
    classify(&site.ranges, kind, values).map_err(|e| e.to_string())
}

/// Re-run the classifier over every stored measurement of the site and
/// persist the statuses that changed. Rows that no longer classify are
/// reported and left untouched.
pub fn reclassify_all(conn: &mut PgConnection, site: &SiteConfig) -> Result<ReclassifyReport, String> {
    use schema::measurements::dsl as M;

    let rows: Vec<(i64, String, serde_json::Value, String)> = M::measurements
        .filter(M::site_id.eq(&site.site_id))
        .order(M::id.asc())
        .select((M::id, M::kind, M::readings, M::status))
        .load(conn)
        .map_err(|e| format!("load measurements for reclassify failed: {}", e))?;

    let mut report = ReclassifyReport {
        scanned: rows.len(),
        ..Default::default()
    };
    let now = Utc::now();
    for (id, kind, readings, stored) in rows {
        let status = match recompute_status(site, &kind, &readings) {
            Ok(s) => s,
            Err(reason) => {
                warn!("Measurements: cannot reclassify {}: {}", id, reason);
                report.failed.push(ReclassifyFailure { id, reason });
                continue;
            }
        };
        if status.as_str() == stored {
            continue;
        }
        diesel::update(M::measurements.find(id))
            .set((M::status.eq(status.as_str()), M::updated_at.eq(now)))
            .execute(conn)
            .map_err(|e| format!("update status of measurement {} failed: {}", id, e))?;
        report.changed += 1;
    }

    info!(
        "Measurements: reclassified (scanned={}, changed={}, failed={})",
        report.scanned,
        report.changed,
        report.failed.len()
    );
    Ok(report)
}

pub fn load_records(conn: &mut PgConnection, site: &SiteConfig) -> Result<Vec<MeasurementRecord>, String> {
    use schema::measurements::dsl as M;

    let rows: Vec<(i64, String, String, DateTime<Utc>)> = M::measurements
        .filter(M::site_id.eq(&site.site_id))
        .select((M::id, M::tower, M::status, M::recorded_at))
        .load(conn)
        .map_err(|e| format!("load measurement records failed: {}", e))?;

    rows.into_iter()
        .map(|(id, tower, status, date)| {
            Ok(MeasurementRecord {
                tower: tower
                    .parse::<Tower>()
                    .map_err(|e| format!("measurement {}: {}", id, e))?,
                status: status
                    .parse::<Status>()
                    .map_err(|e| format!("measurement {}: {}", id, e))?,
                date,
            })
        })
        .collect()
}

pub fn recent_activity(conn: &mut PgConnection, site: &SiteConfig, limit: i64) -> Result<Vec<ActivityItem>, String> {
    use schema::measurements::dsl as M;
    use schema::users::dsl as U;

    let rows: Vec<(i64, DateTime<Utc>, String, String, String, String, Option<String>)> = M::measurements
        .left_join(U::users)
        .filter(M::site_id.eq(&site.site_id))
        .order(M::recorded_at.desc())
        .limit(limit)
        .select((
            M::id,
            M::recorded_at,
            M::tower,
            M::kind,
            M::unit_id,
            M::status,
            U::full_name.nullable(),
        ))
        .load(conn)
        .map_err(|e| format!("load recent measurements failed: {}", e))?;

    rows.into_iter()
        .map(|(id, date, tower, kind, unit_id, status, user)| {
            let context = |e: String| format!("measurement {}: {}", id, e);
            let tower = tower.parse::<Tower>().map_err(context)?;
            let kind = kind
                .parse::<MeasurementKind>()
                .map_err(|e| context(e.to_string()))?;
            let status = status.parse::<Status>().map_err(context)?;
            Ok(ActivityItem::measurement(id, date, tower, kind, &unit_id, status, user))
        })
        .collect()
}
