use crate::config::SiteConfig;
use crate::db::models::{NewProgressEntry, ProgressChanges, ProgressEntry};
use crate::models::dashboard::ActivityItem;
use crate::models::site::{ProgressInput, ProgressPatch, ProgressRecord, Sector, SpaceType, Tower};
use crate::schema;
use crate::services::query::{day_start, like_pattern, DEFAULT_PAGE_SIZE};
use crate::utils::{enum_text, parse_serde_enum};
use crate::validation::{validate_progress, ValidationError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressFilter {
    pub tower: Option<Tower>,
    pub floor: Option<i32>,
    pub sector: Option<Sector>,
    pub space_type: Option<SpaceType>,
    /// Case-insensitive substring
    pub category: Option<String>,
    /// Inclusive day bounds (UTC)
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Matched against location and notes
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Newest first, soft-deleted rows excluded.
pub fn list(conn: &mut PgConnection, site: &SiteConfig, filter: &ProgressFilter) -> Result<Vec<ProgressEntry>, String> {
    use schema::progress_entries::dsl as P;

    let mut query = P::progress_entries
        .filter(P::site_id.eq(&site.site_id))
        .filter(P::deleted_at.is_null())
        .into_boxed();

    if let Some(tower) = filter.tower {
        query = query.filter(P::tower.eq(tower.to_string()));
    }
    if let Some(floor) = filter.floor {
        query = query.filter(P::floor.eq(floor));
    }
    if let Some(sector) = filter.sector {
        query = query.filter(P::sector.eq(enum_text(&sector)));
    }
    if let Some(space_type) = filter.space_type {
        query = query.filter(P::space_type.eq(enum_text(&space_type)));
    }
    if let Some(category) = filter.category.as_deref() {
        query = query.filter(P::category.ilike(like_pattern(category)));
    }
    if let Some(from) = filter.from {
        query = query.filter(P::recorded_at.ge(day_start(from)));
    }
    if let Some(to) = filter.to {
        query = query.filter(P::recorded_at.lt(day_start(to) + Duration::days(1)));
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        query = query.filter(P::location.ilike(pattern.clone()).or(P::notes.ilike(pattern)));
    }

    query
        .order(P::recorded_at.desc())
        .limit(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .offset(filter.offset.unwrap_or(0))
        .select(ProgressEntry::as_select())
        .load(conn)
        .map_err(|e| format!("list progress failed: {}", e))
}

pub fn get(conn: &mut PgConnection, site: &SiteConfig, id: i64) -> Result<Option<ProgressEntry>, String> {
    use schema::progress_entries::dsl as P;

    P::progress_entries
        .find(id)
        .filter(P::site_id.eq(&site.site_id))
        .filter(P::deleted_at.is_null())
        .select(ProgressEntry::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("fetch progress {} failed: {}", id, e))
}

pub fn create(
    conn: &mut PgConnection,
    site: &SiteConfig,
    input: &ProgressInput,
    user_id: Option<i64>,
) -> Result<ProgressEntry, String> {
    use schema::progress_entries::dsl as P;

    let checked = validate_progress(site, input).map_err(|e| e.to_string())?;
    let row = NewProgressEntry {
        site_id: site.site_id.clone(),
        recorded_at: input.date,
        tower: checked.tower.to_string(),
        floor: checked.floor.map(i32::from),
        sector: input.sector.as_ref().map(enum_text),
        space_type: enum_text(&input.space_type),
        location: input.location.trim().to_string(),
        category: input.category.trim().to_string(),
        percentage: i32::from(checked.percentage),
        notes: input.notes.clone(),
        user_id,
    };

    let entry = diesel::insert_into(P::progress_entries)
        .values(&row)
        .returning(ProgressEntry::as_returning())
        .get_result(conn)
        .map_err(|e| format!("insert progress failed: {}", e))?;
    info!(
        "Progress: created {} (tower {} {} at {}%)",
        entry.id, entry.tower, entry.location, entry.percentage
    );
    Ok(entry)
}

/// Rebuild the input a stored row was created from, so a patch can be
/// validated against the merged result.
fn stored_input(entry: &ProgressEntry) -> Result<ProgressInput, String> {
    let space_type: SpaceType = parse_serde_enum(&entry.space_type)
        .ok_or_else(|| format!("progress {} has unknown space type {:?}", entry.id, entry.space_type))?;
    let sector = match entry.sector.as_deref() {
        Some(s) => Some(
            parse_serde_enum::<Sector>(s).ok_or_else(|| format!("progress {} has unknown sector {:?}", entry.id, s))?,
        ),
        None => None,
    };
    Ok(ProgressInput {
        date: entry.recorded_at,
        tower: entry.tower.clone(),
        floor: entry.floor,
        sector,
        space_type,
        location: entry.location.clone(),
        category: entry.category.clone(),
        percentage: entry.percentage,
        notes: entry.notes.clone(),
    })
}

fn apply_patch(base: ProgressInput, patch: &ProgressPatch) -> ProgressInput {
    ProgressInput {
        date: patch.date.unwrap_or(base.date),
        tower: patch.tower.clone().unwrap_or(base.tower),
        floor: patch.floor.or(base.floor),
        sector: patch.sector.or(base.sector),
        space_type: patch.space_type.unwrap_or(base.space_type),
        location: patch.location.clone().unwrap_or(base.location),
        category: patch.category.clone().unwrap_or(base.category),
        percentage: patch.percentage.unwrap_or(base.percentage),
        notes: patch.notes.clone().or(base.notes),
    }
}

/// Partial update; `Ok(None)` when the entry does not exist or was deleted.
pub fn update(
    conn: &mut PgConnection,
    site: &SiteConfig,
    id: i64,
    patch: &ProgressPatch,
) -> Result<Option<ProgressEntry>, String> {
    use schema::progress_entries::dsl as P;

    if patch.is_empty() {
        return Err(ValidationError::EmptyUpdate.to_string());
    }
    let Some(existing) = get(conn, site, id)? else {
        return Ok(None);
    };
    let merged = apply_patch(stored_input(&existing)?, patch);
    let checked = validate_progress(site, &merged).map_err(|e| e.to_string())?;

    let changes = ProgressChanges {
        recorded_at: patch.date,
        tower: patch.tower.as_ref().map(|_| checked.tower.to_string()),
        floor: patch.floor,
        sector: patch.sector.as_ref().map(enum_text),
        space_type: patch.space_type.as_ref().map(enum_text),
        location: patch.location.as_deref().map(|s| s.trim().to_string()),
        category: patch.category.as_deref().map(|s| s.trim().to_string()),
        percentage: patch.percentage,
        notes: patch.notes.clone(),
        updated_at: Some(Utc::now()),
        deleted_at: None,
    };
    let updated = diesel::update(P::progress_entries.find(id).filter(P::deleted_at.is_null()))
        .set(&changes)
        .returning(ProgressEntry::as_returning())
        .get_result(conn)
        .optional()
        .map_err(|e| format!("update progress {} failed: {}", id, e))?;
    if updated.is_some() {
        info!("Progress: updated {}", id);
    }
    Ok(updated)
}

/// Soft delete. Returns whether a live row was marked.
pub fn delete(conn: &mut PgConnection, site: &SiteConfig, id: i64) -> Result<bool, String> {
    use schema::progress_entries::dsl as P;

    let now = Utc::now();
    let changes = ProgressChanges {
        updated_at: Some(now),
        deleted_at: Some(now),
        ..Default::default()
    };
    let count = diesel::update(
        P::progress_entries
            .find(id)
            .filter(P::site_id.eq(&site.site_id))
            .filter(P::deleted_at.is_null()),
    )
    .set(&changes)
    .execute(conn)
    .map_err(|e| format!("delete progress {} failed: {}", id, e))?;
    if count > 0 {
        info!("Progress: deleted {}", id);
    }
    Ok(count > 0)
}

/// All live entries of the site, shaped for the aggregator.
pub fn load_records(conn: &mut PgConnection, site: &SiteConfig) -> Result<Vec<ProgressRecord>, String> {
    use schema::progress_entries::dsl as P;

    let rows: Vec<(i64, String, i32, String, DateTime<Utc>)> = P::progress_entries
        .filter(P::site_id.eq(&site.site_id))
        .filter(P::deleted_at.is_null())
        .select((P::id, P::tower, P::percentage, P::location, P::recorded_at))
        .load(conn)
        .map_err(|e| format!("load progress records failed: {}", e))?;

    rows.into_iter()
        .map(|(id, tower, percentage, location, date)| {
            let tower = tower
                .parse::<Tower>()
                .map_err(|e| format!("progress {}: {}", id, e))?;
            let percentage = u8::try_from(percentage)
                .ok()
                .filter(|p| *p <= 100)
                .ok_or_else(|| format!("progress {}: percentage {} out of range", id, percentage))?;
            Ok(ProgressRecord {
                tower,
                percentage,
                location,
                date,
            })
        })
        .collect()
}

/// Newest entries with their author's name, for the activity feed.
pub fn recent_activity(conn: &mut PgConnection, site: &SiteConfig, limit: i64) -> Result<Vec<ActivityItem>, String> {
    use schema::progress_entries::dsl as P;
    use schema::users::dsl as U;

    let rows: Vec<(i64, DateTime<Utc>, String, i32, String, String, Option<String>)> = P::progress_entries
        .left_join(U::users)
        .filter(P::site_id.eq(&site.site_id))
        .filter(P::deleted_at.is_null())
        .order(P::recorded_at.desc())
        .limit(limit)
        .select((
            P::id,
            P::recorded_at,
            P::tower,
            P::percentage,
            P::location,
            P::category,
            U::full_name.nullable(),
        ))
        .load(conn)
        .map_err(|e| format!("load recent progress failed: {}", e))?;

    rows.into_iter()
        .map(|(id, date, tower, percentage, location, category, user)| {
            let tower = tower
                .parse::<Tower>()
                .map_err(|e| format!("progress {}: {}", id, e))?;
            Ok(ActivityItem::progress(
                id, date, tower, percentage, &location, &category, user,
            ))
        })
        .collect()
}
