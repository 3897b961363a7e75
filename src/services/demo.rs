use crate::classifier::{range_category, Bounds};
use crate::config::SiteConfig;
use crate::models::site::{
    CertificationState, MeasurementInput, MeasurementKind, ProgressInput, Reading, Role, Sector, SpaceType, Tower,
    UserInput,
};
use crate::services::{measurements, progress, users};
use crate::validation::{sector_allowed, unit_location};
use chrono::{DateTime, Duration, Utc};
use diesel::PgConnection;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const DEMO_SEED: u64 = 0x0E7C_1705_2025_0001;
const HISTORY_DAYS: i64 = 45;
const PROGRESS_ENTRIES: usize = 240;
const MEASUREMENTS: usize = 160;
const PERCENT_STEPS: [i32; 5] = [20, 40, 60, 80, 100];
const CATEGORIES: [&str; 6] = [
    "Canalizacion",
    "Cableado estructurado",
    "Conectorizacion",
    "Fibra optica",
    "Instalacion de equipos",
    "Certificacion",
];
const DEMO_USERS: [(&str, &str, Role); 4] = [
    ("msoto", "Marcela Soto", Role::Supervisor),
    ("jrojas", "Javier Rojas", Role::Technician),
    ("cmunoz", "Camila Munoz", Role::Technician),
    ("pvera", "Pedro Vera", Role::Helper),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemoReport {
    pub users: usize,
    pub progress_entries: usize,
    pub measurements: usize,
    /// Set when the site already had data and nothing was generated.
    pub skipped: bool,
}

/// Seed a deterministic synthetic history for the site. Everything goes
/// through the regular create path, so stored statuses come from the
/// classifier. A site that already has progress entries is left alone.
pub fn run(conn: &mut PgConnection, site: &SiteConfig) -> Result<DemoReport, String> {
    if site.towers.is_empty() {
        return Err("demo data needs at least one configured tower".to_string());
    }
    let existing = progress::list(
        conn,
        site,
        &progress::ProgressFilter {
            limit: Some(1),
            ..Default::default()
        },
    )?;
    if !existing.is_empty() {
        info!("Demo data: site {} already has progress entries, skipping", site.site_id);
        return Ok(DemoReport {
            skipped: true,
            ..Default::default()
        });
    }

    let user_ids = ensure_users(conn)?;
    let mut rng = SmallRng::seed_from_u64(DEMO_SEED);
    let end = Utc::now();
    info!(
        "Demo data: generating {} progress entries and {} measurements over {} day(s) for {}",
        PROGRESS_ENTRIES, MEASUREMENTS, HISTORY_DAYS, site.site_id
    );

    let mut report = DemoReport {
        users: user_ids.len(),
        ..Default::default()
    };
    for _ in 0..PROGRESS_ENTRIES {
        let input = demo_progress(&mut rng, site, end);
        let user_id = pick(&mut rng, &user_ids).copied();
        progress::create(conn, site, &input, user_id)?;
        report.progress_entries += 1;
    }
    for _ in 0..MEASUREMENTS {
        let input = demo_measurement(&mut rng, site, end);
        let user_id = pick(&mut rng, &user_ids).copied();
        measurements::create(conn, site, &input, user_id)?;
        report.measurements += 1;
    }

    info!(
        "Demo data: complete (users={}, progress={}, measurements={})",
        report.users, report.progress_entries, report.measurements
    );
    Ok(report)
}

fn ensure_users(conn: &mut PgConnection) -> Result<Vec<i64>, String> {
    let mut ids = Vec::with_capacity(DEMO_USERS.len());
    for (username, full_name, role) in DEMO_USERS {
        let id = match users::find_by_username(conn, username)? {
            Some(user) => user.id,
            None => {
                let input = UserInput {
                    username: username.to_string(),
                    email: Some(format!("{}@losencinos.cl", username)),
                    full_name: full_name.to_string(),
                    role,
                };
                users::create(conn, &input)?.id
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

fn pick<'a, T>(rng: &mut SmallRng, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len()))
}

/// A moment within the last `HISTORY_DAYS`, during working hours.
fn sample_date(rng: &mut SmallRng, end: DateTime<Utc>) -> DateTime<Utc> {
    let days_back = rng.random_range(0..HISTORY_DAYS);
    let hour = rng.random_range(8..18);
    let minute = rng.random_range(0..60);
    let day = (end - Duration::days(days_back)).date_naive();
    let at = day.and_hms_opt(hour, minute, 0).map(|t| t.and_utc()).unwrap_or(end);
    at.min(end)
}

/// A unit location that passes the tower and sector layout rules.
fn sample_unit(rng: &mut SmallRng, site: &SiteConfig) -> (Tower, u8, Sector, u8) {
    // `run` rejects sites without towers
    let tower = site.towers[rng.random_range(0..site.towers.len())];
    let floor = rng.random_range(1..=site.max_floor);
    let sectors: Vec<Sector> = [Sector::Norte, Sector::Poniente, Sector::Oriente]
        .into_iter()
        .filter(|s| sector_allowed(tower, *s))
        .collect();
    let sector = pick(rng, &sectors).copied().unwrap_or(Sector::Poniente);
    let unit = rng.random_range(sector.unit_numbers());
    (tower, floor, sector, unit)
}

fn demo_progress(rng: &mut SmallRng, site: &SiteConfig, end: DateTime<Utc>) -> ProgressInput {
    let date = sample_date(rng, end);
    let (tower, floor, sector, unit) = sample_unit(rng, site);
    let percentage = PERCENT_STEPS[rng.random_range(0..PERCENT_STEPS.len())];
    let category = CATEGORIES[rng.random_range(0..CATEGORIES.len())].to_string();

    if rng.random_bool(0.85) {
        return ProgressInput {
            date,
            tower: tower.to_string(),
            floor: Some(i32::from(floor)),
            sector: Some(sector),
            space_type: SpaceType::Unit,
            location: unit_location(tower, floor, unit),
            category,
            percentage,
            notes: None,
        };
    }

    let space_type = [SpaceType::Sotu, SpaceType::Shaft, SpaceType::Lateral, SpaceType::Antenna]
        [rng.random_range(0..4)];
    let label = match space_type {
        SpaceType::Sotu => "SOTU",
        SpaceType::Shaft => "Shaft",
        SpaceType::Lateral => "Lateral",
        SpaceType::Antenna => "Antena",
        SpaceType::Unit => "Unidad",
    };
    ProgressInput {
        date,
        tower: tower.to_string(),
        floor: Some(i32::from(floor)),
        sector: None,
        space_type,
        location: format!("{} {}{:02}", label, tower, floor),
        category,
        percentage,
        notes: Some("Registro generado".to_string()),
    }
}

/// Mostly comfortable readings, some near the edges and a few out of range.
fn sample_level(rng: &mut SmallRng, bounds: Bounds, margin: f64) -> f64 {
    let roll: f64 = rng.random_range(0.0..1.0);
    let value = if roll < 0.8 {
        rng.random_range(bounds.min + margin..=bounds.max - margin)
    } else if roll < 0.95 {
        if rng.random_bool(0.5) {
            rng.random_range(bounds.min..bounds.min + margin)
        } else {
            rng.random_range(bounds.max - margin..bounds.max)
        }
    } else if rng.random_bool(0.5) {
        bounds.min - rng.random_range(0.5..=8.0)
    } else {
        bounds.max + rng.random_range(0.5..=8.0)
    };
    (value * 10.0).round() / 10.0
}

fn demo_reading(rng: &mut SmallRng, site: &SiteConfig, kind: MeasurementKind) -> Reading {
    let level = |rng: &mut SmallRng| match range_category(kind) {
        Some(category) => sample_level(rng, site.ranges.bounds(category), site.ranges.margin()),
        None => 0.0,
    };
    match kind {
        MeasurementKind::WiredT1 => Reading::WiredT1 { t1_level: level(rng) },
        MeasurementKind::WiredT2 => Reading::WiredT2 { t2_level: level(rng) },
        MeasurementKind::Coaxial => Reading::Coaxial { coax_level: level(rng) },
        MeasurementKind::Wifi => Reading::Wifi { wifi_level: level(rng) },
        MeasurementKind::Fiber => Reading::Fiber {
            tx_power: Some(level(rng)),
            rx_power: Some(level(rng)),
            attenuation: rng
                .random_bool(0.5)
                .then(|| (rng.random_range(0.3..=4.0_f64) * 10.0).round() / 10.0),
        },
        MeasurementKind::Certification => {
            let roll: f64 = rng.random_range(0.0..1.0);
            let certification_state = if roll < 0.8 {
                CertificationState::Approved
            } else if roll < 0.93 {
                CertificationState::ApprovedWithObservations
            } else {
                CertificationState::Rejected
            };
            Reading::Certification { certification_state }
        }
    }
}

fn demo_measurement(rng: &mut SmallRng, site: &SiteConfig, end: DateTime<Utc>) -> MeasurementInput {
    let date = sample_date(rng, end);
    let (tower, floor, _, unit) = sample_unit(rng, site);
    let kind = MeasurementKind::ALL[rng.random_range(0..MeasurementKind::ALL.len())];
    let reading = demo_reading(rng, site, kind);
    MeasurementInput {
        date,
        tower: tower.to_string(),
        floor: i32::from(floor),
        unit_id: unit_location(tower, floor, unit),
        kind,
        values: reading.values_json(),
        notes: None,
    }
}
