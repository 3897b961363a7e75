//! Write-boundary checks for the site structure and for incoming payloads.
//!
//! Unit locations follow `<tower><floor:02><unit:02>`, e.g. `A0113`. Sectors
//! own fixed unit numbers (Norte 01-06, Poniente 07-12, Oriente 13-18); towers
//! C and H have no Norte sector.

use crate::config::SiteConfig;
use crate::models::site::{
    MeasurementInput, ProgressInput, Reading, Sector, SpaceType, Tower, UserInput, UserPatch,
};
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MAX_LOCATION_LEN: usize = 50;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_UNIT_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Tower(String),
    Floor { floor: i32, max: u8 },
    SectorNotInTower { tower: Tower, sector: Sector },
    Location { location: String, reason: String },
    Percentage(i32),
    Length { field: &'static str, min: usize, max: usize, len: usize },
    Username(String),
    Email(String),
    Reading(String),
    EmptyUpdate,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Tower(reason) => write!(f, "invalid tower: {}", reason),
            ValidationError::Floor { floor, max } => write!(f, "floor {} outside 1..={}", floor, max),
            ValidationError::SectorNotInTower { tower, sector } => {
                write!(f, "tower {} has no {:?} sector", tower, sector)
            }
            ValidationError::Location { location, reason } => write!(f, "invalid location {:?}: {}", location, reason),
            ValidationError::Percentage(p) => write!(f, "percentage {} outside 0..=100", p),
            ValidationError::Length { field, min, max, len } => {
                write!(f, "{} must be {}..={} characters, got {}", field, min, max, len)
            }
            ValidationError::Username(u) => {
                write!(f, "username {:?} must be 3..=50 characters of letters, digits or '_'", u)
            }
            ValidationError::Email(e) => write!(f, "invalid email {:?}", e),
            ValidationError::Reading(reason) => write!(f, "invalid reading: {}", reason),
            ValidationError::EmptyUpdate => write!(f, "no fields to update"),
        }
    }
}

impl Error for ValidationError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnitLocation {
    pub tower: Tower,
    pub floor: u8,
    pub unit: u8,
}

pub fn unit_location(tower: Tower, floor: u8, unit: u8) -> String {
    format!("{}{:02}{:02}", tower, floor, unit)
}

pub fn parse_unit_location(location: &str) -> Option<UnitLocation> {
    let bytes = location.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let tower = Tower::new(bytes[0] as char)?;
    let floor = location[1..3].parse().ok()?;
    let unit = location[3..5].parse().ok()?;
    Some(UnitLocation { tower, floor, unit })
}

pub fn sector_allowed(tower: Tower, sector: Sector) -> bool {
    !(sector == Sector::Norte && matches!(tower.letter(), 'C' | 'H'))
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length { field, min, max, len });
    }
    Ok(())
}

fn check_notes(notes: Option<&str>) -> Result<(), ValidationError> {
    match notes {
        Some(n) => check_length("notes", n, 0, MAX_NOTES_LEN),
        None => Ok(()),
    }
}

pub fn validate_tower(site: &SiteConfig, raw: &str) -> Result<Tower, ValidationError> {
    let tower: Tower = raw.parse().map_err(ValidationError::Tower)?;
    if !site.towers.contains(&tower) {
        return Err(ValidationError::Tower(format!("{} is not a configured tower", tower)));
    }
    Ok(tower)
}

pub fn validate_floor(site: &SiteConfig, floor: i32) -> Result<u8, ValidationError> {
    match u8::try_from(floor) {
        Ok(f) if (1..=site.max_floor).contains(&f) => Ok(f),
        _ => Err(ValidationError::Floor {
            floor,
            max: site.max_floor,
        }),
    }
}

pub fn validate_percentage(percentage: i32) -> Result<u8, ValidationError> {
    match u8::try_from(percentage) {
        Ok(p) if p <= 100 => Ok(p),
        _ => Err(ValidationError::Percentage(percentage)),
    }
}

/// Cross-field checks on where a piece of work happened.
pub fn validate_location(
    tower: Tower,
    floor: Option<u8>,
    sector: Option<Sector>,
    space_type: SpaceType,
    location: &str,
) -> Result<(), ValidationError> {
    check_length("location", location, 1, MAX_LOCATION_LEN)?;
    if let Some(sector) = sector
        && !sector_allowed(tower, sector)
    {
        return Err(ValidationError::SectorNotInTower { tower, sector });
    }

    let (SpaceType::Unit, Some(floor)) = (space_type, floor) else {
        return Ok(());
    };
    let bad = |reason: String| ValidationError::Location {
        location: location.to_string(),
        reason,
    };
    let unit = parse_unit_location(location.trim())
        .ok_or_else(|| bad("expected <tower><floor:02><unit:02>".to_string()))?;
    if unit.tower != tower {
        return Err(bad(format!("belongs to tower {}, not {}", unit.tower, tower)));
    }
    if unit.floor != floor {
        return Err(bad(format!("belongs to floor {}, not {}", unit.floor, floor)));
    }
    if let Some(sector) = sector
        && !sector.unit_numbers().contains(&unit.unit)
    {
        return Err(bad(format!("unit {:02} is not in sector {:?}", unit.unit, sector)));
    }
    Ok(())
}

/// Range-independent sanity checks on a typed reading.
pub fn validate_reading(reading: &Reading) -> Result<(), ValidationError> {
    let levels: Vec<(&str, f64)> = match reading {
        Reading::WiredT1 { t1_level } => vec![("t1_level", *t1_level)],
        Reading::WiredT2 { t2_level } => vec![("t2_level", *t2_level)],
        Reading::Coaxial { coax_level } => vec![("coax_level", *coax_level)],
        Reading::Wifi { wifi_level } => vec![("wifi_level", *wifi_level)],
        Reading::Fiber {
            tx_power,
            rx_power,
            attenuation,
        } => {
            if tx_power.is_none() && rx_power.is_none() {
                return Err(ValidationError::Reading(
                    "fiber needs tx_power, rx_power or both".to_string(),
                ));
            }
            [("tx_power", tx_power), ("rx_power", rx_power), ("attenuation", attenuation)]
                .into_iter()
                .filter_map(|(name, v)| v.map(|v| (name, v)))
                .collect()
        }
        Reading::Certification { .. } => vec![],
    };
    match levels.iter().find(|(_, v)| !v.is_finite()) {
        Some((name, v)) => Err(ValidationError::Reading(format!("{} must be finite, got {}", name, v))),
        None => Ok(()),
    }
}

/// A progress entry whose fields passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedProgress {
    pub tower: Tower,
    pub floor: Option<u8>,
    pub percentage: u8,
}

pub fn validate_progress(site: &SiteConfig, input: &ProgressInput) -> Result<CheckedProgress, ValidationError> {
    let tower = validate_tower(site, &input.tower)?;
    let floor = input.floor.map(|f| validate_floor(site, f)).transpose()?;
    let percentage = validate_percentage(input.percentage)?;
    check_length("category", &input.category, 1, MAX_CATEGORY_LEN)?;
    check_notes(input.notes.as_deref())?;
    validate_location(tower, floor, input.sector, input.space_type, &input.location)?;
    Ok(CheckedProgress {
        tower,
        floor,
        percentage,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckedMeasurement {
    pub tower: Tower,
    pub floor: u8,
    pub reading: Reading,
}

pub fn validate_measurement(
    site: &SiteConfig,
    input: &MeasurementInput,
) -> Result<CheckedMeasurement, ValidationError> {
    let tower = validate_tower(site, &input.tower)?;
    let floor = validate_floor(site, input.floor)?;
    check_length("unit_id", &input.unit_id, 1, MAX_UNIT_ID_LEN)?;
    check_notes(input.notes.as_deref())?;
    let reading =
        Reading::from_parts(input.kind, &input.values).map_err(|e| ValidationError::Reading(e.to_string()))?;
    validate_reading(&reading)?;
    Ok(CheckedMeasurement { tower, floor, reading })
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let ok_chars = username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let len = username.chars().count();
    if !ok_chars || !(3..=50).contains(&len) {
        return Err(ValidationError::Username(username.to_string()));
    }
    Ok(())
}

/// Shape check only: `local@domain.tld` without whitespace.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::Email(email.to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if local.is_empty() || host.is_empty() || domain.contains('@') || tld.len() < 2 {
        return Err(invalid());
    }
    if !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_user(input: &UserInput) -> Result<(), ValidationError> {
    validate_username(&input.username)?;
    if let Some(email) = input.email.as_deref() {
        validate_email(email)?;
    }
    check_length("full_name", &input.full_name, 2, 100)
}

pub fn validate_user_patch(patch: &UserPatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }
    if let Some(email) = patch.email.as_deref() {
        validate_email(email)?;
    }
    if let Some(name) = patch.full_name.as_deref() {
        check_length("full_name", name, 2, 100)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site::MeasurementKind;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn tower(c: char) -> Tower {
        Tower::new(c).unwrap()
    }

    fn progress_input(location: &str, floor: Option<i32>, sector: Option<Sector>) -> ProgressInput {
        ProgressInput {
            date: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
            tower: "A".to_string(),
            floor,
            sector,
            space_type: SpaceType::Unit,
            location: location.to_string(),
            category: "Cableado".to_string(),
            percentage: 80,
            notes: None,
        }
    }

    #[test]
    fn unit_locations_round_trip() {
        let loc = unit_location(tower('B'), 3, 7);
        assert_eq!(loc, "B0307");
        assert_eq!(
            parse_unit_location(&loc),
            Some(UnitLocation {
                tower: tower('B'),
                floor: 3,
                unit: 7
            })
        );
        assert_eq!(parse_unit_location("B307"), None);
        assert_eq!(parse_unit_location("b0307"), None);
        assert_eq!(parse_unit_location("B03x7"), None);
    }

    #[test]
    fn towers_c_and_h_have_no_north_sector() {
        assert!(!sector_allowed(tower('C'), Sector::Norte));
        assert!(!sector_allowed(tower('H'), Sector::Norte));
        assert!(sector_allowed(tower('C'), Sector::Oriente));
        assert!(sector_allowed(tower('A'), Sector::Norte));
    }

    #[test]
    fn progress_validation_accepts_consistent_unit() {
        let site = SiteConfig::default();
        let checked = validate_progress(&site, &progress_input("A0102", Some(1), Some(Sector::Norte)))
            .expect("valid progress");
        assert_eq!(checked.tower, tower('A'));
        assert_eq!(checked.floor, Some(1));
        assert_eq!(checked.percentage, 80);
    }

    #[test]
    fn progress_validation_rejects_mismatches() {
        let site = SiteConfig::default();
        let wrong_floor = validate_progress(&site, &progress_input("A0202", Some(1), None));
        assert!(matches!(wrong_floor, Err(ValidationError::Location { .. })));

        let wrong_sector = validate_progress(&site, &progress_input("A0114", Some(1), Some(Sector::Norte)));
        assert!(matches!(wrong_sector, Err(ValidationError::Location { .. })));

        let mut input = progress_input("A0101", Some(1), None);
        input.percentage = 101;
        assert_eq!(validate_progress(&site, &input), Err(ValidationError::Percentage(101)));

        input.percentage = 100;
        input.tower = "Z".to_string();
        assert!(matches!(validate_progress(&site, &input), Err(ValidationError::Tower(_))));

        input.tower = "A".to_string();
        input.floor = Some(21);
        assert_eq!(
            validate_progress(&site, &input),
            Err(ValidationError::Floor { floor: 21, max: 20 })
        );
    }

    #[test]
    fn non_unit_spaces_skip_location_format() {
        let site = SiteConfig::default();
        let mut input = progress_input("Shaft poniente", Some(4), None);
        input.space_type = SpaceType::Shaft;
        assert!(validate_progress(&site, &input).is_ok());
    }

    #[test]
    fn measurement_validation_builds_typed_reading() {
        let site = SiteConfig::default();
        let input = MeasurementInput {
            date: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
            tower: "c".to_string(),
            floor: 2,
            unit_id: "C0209".to_string(),
            kind: MeasurementKind::Fiber,
            values: json!({ "rx_power": -21.0 }),
            notes: Some("ok".to_string()),
        };
        let checked = validate_measurement(&site, &input).expect("valid measurement");
        assert_eq!(checked.tower, tower('C'));
        assert_eq!(
            checked.reading,
            Reading::Fiber {
                tx_power: None,
                rx_power: Some(-21.0),
                attenuation: None
            }
        );

        let empty_fiber = MeasurementInput {
            values: json!({}),
            ..input.clone()
        };
        assert!(matches!(
            validate_measurement(&site, &empty_fiber),
            Err(ValidationError::Reading(_))
        ));

        let wrong_type = MeasurementInput {
            kind: MeasurementKind::Wifi,
            values: json!({ "wifi_level": "strong" }),
            ..input
        };
        assert!(matches!(
            validate_measurement(&site, &wrong_type),
            Err(ValidationError::Reading(_))
        ));
    }

    #[test]
    fn user_fields() {
        assert!(validate_username("jperez_2").is_ok());
        assert!(validate_username("jp").is_err());
        assert!(validate_username("j perez").is_err());
        assert!(validate_email("ana@encinos.cl").is_ok());
        assert!(validate_email("ana@encinos").is_err());
        assert!(validate_email("@encinos.cl").is_err());
        assert!(validate_email("ana@@encinos.cl").is_err());
        assert_eq!(validate_user_patch(&UserPatch::default()), Err(ValidationError::EmptyUpdate));
    }
}
