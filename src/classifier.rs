//! Measurement classification: raw signal levels to OK / WARNING / FAILURE.
//!
//! Bounds come from a [`RangeTable`] handed in by the caller (normally
//! `SiteConfig::ranges`). Two entry points exist:
//! - [`classify_reading`] for typed readings that passed validation; it cannot fail.
//! - [`classify`] for stored key-bag payloads. Missing fields degrade to OK to
//!   stay compatible with rows written by the legacy service; present but
//!   malformed values and unknown kinds are rejected.

use crate::models::site::{CertificationState, MeasurementKind, Reading, Status};
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_WARNING_MARGIN: f64 = 5.0;

/// Open key-bag form of a measurement's `values`.
pub type ValueBag = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyError {
    /// The measurement type is not one of the six known kinds
    UnknownKind(String),
    /// The range category name does not exist
    UnknownCategory(String),
    /// A level field is present but not a finite number
    NonNumeric { field: String, value: String },
    /// A certification state outside the known set
    InvalidCertification(String),
}

impl Display for ClassifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyError::UnknownKind(k) => write!(f, "unknown measurement kind {:?}", k),
            ClassifyError::UnknownCategory(c) => write!(f, "unknown range category {:?}", c),
            ClassifyError::NonNumeric { field, value } => {
                write!(f, "field {} must be a finite number, got {}", field, value)
            }
            ClassifyError::InvalidCertification(s) => write!(f, "unknown certification state {}", s),
        }
    }
}

impl Error for ClassifyError {}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeTableError {
    MissingCategory(RangeCategory),
    EmptyRange { category: RangeCategory, min: f64, max: f64 },
    InvalidMargin(f64),
    /// The warning bands would meet in the middle and swallow the OK band
    MarginTooWide { category: RangeCategory, margin: f64, width: f64 },
}

impl Display for RangeTableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RangeTableError::MissingCategory(c) => write!(f, "range table has no bounds for {}", c),
            RangeTableError::EmptyRange { category, min, max } => {
                write!(f, "range {} must satisfy min < max (min={}, max={})", category, min, max)
            }
            RangeTableError::InvalidMargin(m) => write!(f, "warning margin must be finite and > 0, got {}", m),
            RangeTableError::MarginTooWide { category, margin, width } => write!(
                f,
                "warning margin {} must be smaller than half the width of range {} (width={})",
                margin, category, width
            ),
        }
    }
}

impl Error for RangeTableError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeCategory {
    Wired,
    Coaxial,
    FiberPower,
    Wifi,
}

impl RangeCategory {
    pub const ALL: [RangeCategory; 4] = [
        RangeCategory::Wired,
        RangeCategory::Coaxial,
        RangeCategory::FiberPower,
        RangeCategory::Wifi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RangeCategory::Wired => "wired",
            RangeCategory::Coaxial => "coaxial",
            RangeCategory::FiberPower => "fiber-power",
            RangeCategory::Wifi => "wifi",
        }
    }
}

impl Display for RangeCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeCategory {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wired" | "alambrico" => Ok(RangeCategory::Wired),
            "coaxial" => Ok(RangeCategory::Coaxial),
            "fiber-power" | "fibra_potencia" => Ok(RangeCategory::FiberPower),
            "wifi" => Ok(RangeCategory::Wifi),
            other => Err(ClassifyError::UnknownCategory(other.to_string())),
        }
    }
}

/// Acceptable `[min, max]` interval, in dBμV or dBm depending on the category.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Bounds { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Immutable bounds per range category plus the shared warning margin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeTable {
    bounds: BTreeMap<RangeCategory, Bounds>,
    margin: f64,
}

impl RangeTable {
    /// Every category must be present, each with `min < max`. The margin must
    /// be positive, so the WARNING band exists, and must leave a non-empty OK
    /// band in every range.
    pub fn new(
        bounds: impl IntoIterator<Item = (RangeCategory, Bounds)>,
        margin: f64,
    ) -> Result<Self, RangeTableError> {
        if !margin.is_finite() || margin <= 0.0 {
            return Err(RangeTableError::InvalidMargin(margin));
        }
        let bounds: BTreeMap<_, _> = bounds.into_iter().collect();
        for category in RangeCategory::ALL {
            let b = bounds
                .get(&category)
                .ok_or(RangeTableError::MissingCategory(category))?;
            if !(b.min.is_finite() && b.max.is_finite() && b.min < b.max) {
                return Err(RangeTableError::EmptyRange {
                    category,
                    min: b.min,
                    max: b.max,
                });
            }
            if margin >= b.width() / 2.0 {
                return Err(RangeTableError::MarginTooWide {
                    category,
                    margin,
                    width: b.width(),
                });
            }
        }
        Ok(RangeTable { bounds, margin })
    }

    pub fn bounds(&self, category: RangeCategory) -> Bounds {
        // `new` guarantees every category is present
        self.bounds
            .get(&category)
            .copied()
            .unwrap_or(Bounds::new(f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn evaluate(&self, value: f64, category: RangeCategory) -> Status {
        evaluate_range(value, self.bounds(category), self.margin)
    }

    /// Like [`RangeTable::evaluate`], for a category given by name
    /// (`ranges <category> <value>`).
    pub fn evaluate_named(&self, value: f64, category: &str) -> Result<Status, ClassifyError> {
        Ok(self.evaluate(value, category.parse()?))
    }
}

impl Default for RangeTable {
    fn default() -> Self {
        RangeTable {
            bounds: BTreeMap::from([
                (RangeCategory::Wired, Bounds::new(45.0, 75.0)),
                (RangeCategory::Coaxial, Bounds::new(45.0, 75.0)),
                (RangeCategory::FiberPower, Bounds::new(-30.0, -8.0)),
                (RangeCategory::Wifi, Bounds::new(-80.0, -30.0)),
            ]),
            margin: DEFAULT_WARNING_MARGIN,
        }
    }
}

/// Outside `[min, max]` fails; within `margin` of either bound warns.
pub fn evaluate_range(value: f64, bounds: Bounds, margin: f64) -> Status {
    if value < bounds.min || value > bounds.max {
        Status::Failure
    } else if value < bounds.min + margin || value > bounds.max - margin {
        Status::Warning
    } else {
        Status::Ok
    }
}

/// Worst-case reduction; an empty input is OK.
pub fn worst(statuses: impl IntoIterator<Item = Status>) -> Status {
    statuses.into_iter().max().unwrap_or(Status::Ok)
}

pub fn certification_status(state: CertificationState) -> Status {
    match state {
        CertificationState::Approved => Status::Ok,
        CertificationState::ApprovedWithObservations => Status::Warning,
        CertificationState::Rejected => Status::Failure,
    }
}

/// Range category a kind is checked against; certification has none.
pub fn range_category(kind: MeasurementKind) -> Option<RangeCategory> {
    match kind {
        MeasurementKind::WiredT1 | MeasurementKind::WiredT2 => Some(RangeCategory::Wired),
        MeasurementKind::Coaxial => Some(RangeCategory::Coaxial),
        MeasurementKind::Fiber => Some(RangeCategory::FiberPower),
        MeasurementKind::Wifi => Some(RangeCategory::Wifi),
        MeasurementKind::Certification => None,
    }
}

/// Key-bag field names evaluated for a kind; each entry lists the canonical
/// name first, then its legacy alias.
fn level_fields(kind: MeasurementKind) -> &'static [[&'static str; 2]] {
    match kind {
        MeasurementKind::WiredT1 => &[["t1_level", "alambrico_t1"]],
        MeasurementKind::WiredT2 => &[["t2_level", "alambrico_t2"]],
        MeasurementKind::Coaxial => &[["coax_level", "coaxial"]],
        MeasurementKind::Fiber => &[["tx_power", "potencia_tx"], ["rx_power", "potencia_rx"]],
        MeasurementKind::Wifi => &[["wifi_level", "wifi"]],
        MeasurementKind::Certification => &[],
    }
}

const CERTIFICATION_FIELD: [&str; 2] = ["certification_state", "certificacion"];

fn lookup<'a>(values: &'a ValueBag, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    names
        .iter()
        .find_map(|name| values.get(*name).filter(|v| !v.is_null()).map(|v| (*name, v)))
}

pub fn classify_reading(table: &RangeTable, reading: &Reading) -> Status {
    match reading {
        Reading::WiredT1 { t1_level } => table.evaluate(*t1_level, RangeCategory::Wired),
        Reading::WiredT2 { t2_level } => table.evaluate(*t2_level, RangeCategory::Wired),
        Reading::Coaxial { coax_level } => table.evaluate(*coax_level, RangeCategory::Coaxial),
        Reading::Fiber {
            tx_power, rx_power, ..
        } => worst(
            [tx_power, rx_power]
                .into_iter()
                .flatten()
                .map(|power| table.evaluate(*power, RangeCategory::FiberPower)),
        ),
        Reading::Wifi { wifi_level } => table.evaluate(*wifi_level, RangeCategory::Wifi),
        Reading::Certification { certification_state } => certification_status(*certification_state),
    }
}

/// Classify a `(type, values)` pair as stored by the write path.
pub fn classify(table: &RangeTable, kind: &str, values: &ValueBag) -> Result<Status, ClassifyError> {
    classify_values(table, kind.parse()?, values)
}

pub fn classify_values(table: &RangeTable, kind: MeasurementKind, values: &ValueBag) -> Result<Status, ClassifyError> {
    let Some(category) = range_category(kind) else {
        return match lookup(values, &CERTIFICATION_FIELD) {
            None => Ok(Status::Ok),
            Some((_, Value::String(s))) => Ok(certification_status(s.parse()?)),
            Some((_, other)) => Err(ClassifyError::InvalidCertification(other.to_string())),
        };
    };

    let mut statuses = Vec::with_capacity(2);
    for names in level_fields(kind) {
        let Some((field, value)) = lookup(values, names) else {
            continue;
        };
        let level = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ClassifyError::NonNumeric {
                field: field.to_string(),
                value: value.to_string(),
            })?;
        statuses.push(table.evaluate(level, category));
    }
    Ok(worst(statuses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(v: Value) -> ValueBag {
        match v {
            Value::Object(map) => map,
            _ => panic!("test bag must be an object"),
        }
    }

    #[test]
    fn range_outcomes_partition_the_line() {
        let table = RangeTable::default();
        for category in [RangeCategory::Wired, RangeCategory::Coaxial, RangeCategory::Wifi] {
            let b = table.bounds(category);
            let m = table.margin();
            let mut v = b.min - 20.0;
            while v <= b.max + 20.0 {
                let outside = v < b.min || v > b.max;
                let near_min = v >= b.min && v < b.min + m;
                let near_max = v > b.max - m && v <= b.max;
                let expected = if outside {
                    Status::Failure
                } else if near_min || near_max {
                    Status::Warning
                } else {
                    Status::Ok
                };
                assert_eq!(table.evaluate(v, category), expected, "category={} v={}", category, v);
                v += 0.25;
            }
        }
    }

    #[test]
    fn wired_range_boundaries() {
        let table = RangeTable::default();
        let at = |v| table.evaluate(v, RangeCategory::Wired);
        assert_eq!(at(44.9), Status::Failure);
        assert_eq!(at(45.0), Status::Warning);
        assert_eq!(at(49.9), Status::Warning);
        assert_eq!(at(50.0), Status::Ok);
        assert_eq!(at(70.0), Status::Ok);
        assert_eq!(at(70.1), Status::Warning);
        assert_eq!(at(75.0), Status::Warning);
        assert_eq!(at(75.1), Status::Failure);
    }

    #[test]
    fn certification_maps_directly() {
        let table = RangeTable::default();
        let cases = [
            ("REJECTED", Status::Failure),
            ("APPROVED_WITH_OBSERVATIONS", Status::Warning),
            ("APPROVED", Status::Ok),
            ("RECHAZADO", Status::Failure),
        ];
        for (state, expected) in cases {
            let values = bag(json!({ "certification_state": state }));
            assert_eq!(classify(&table, "certification", &values), Ok(expected), "{}", state);
        }
        assert_eq!(classify(&table, "certification", &ValueBag::new()), Ok(Status::Ok));
        assert!(matches!(
            classify(&table, "certification", &bag(json!({ "certification_state": "MAYBE" }))),
            Err(ClassifyError::InvalidCertification(_))
        ));
    }

    #[test]
    fn fiber_takes_the_worst_of_both_powers() {
        let table = RangeTable::default();
        let both_out = bag(json!({ "tx_power": -5, "rx_power": -40 }));
        assert_eq!(classify(&table, "fiber", &both_out), Ok(Status::Failure));

        let one_warning = bag(json!({ "tx_power": -20, "rx_power": -27 }));
        assert_eq!(classify(&table, "fiber", &one_warning), Ok(Status::Warning));

        let only_rx = bag(json!({ "rx_power": -18.5 }));
        assert_eq!(classify(&table, "fiber", &only_rx), Ok(Status::Ok));

        let reading = Reading::Fiber {
            tx_power: Some(-5.0),
            rx_power: Some(-40.0),
            attenuation: Some(0.3),
        };
        assert_eq!(classify_reading(&table, &reading), Status::Failure);
    }

    #[test]
    fn missing_levels_degrade_to_ok() {
        let table = RangeTable::default();
        for kind in MeasurementKind::ALL {
            assert_eq!(classify_values(&table, kind, &ValueBag::new()), Ok(Status::Ok), "{}", kind);
        }
        let null_level = bag(json!({ "coax_level": null }));
        assert_eq!(classify(&table, "coaxial", &null_level), Ok(Status::Ok));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let table = RangeTable::default();
        assert_eq!(
            classify(&table, "sonar", &ValueBag::new()),
            Err(ClassifyError::UnknownKind("sonar".to_string()))
        );
        assert_eq!(
            classify(&table, "wifi", &bag(json!({ "wifi_level": "-55" }))),
            Err(ClassifyError::NonNumeric {
                field: "wifi_level".to_string(),
                value: "\"-55\"".to_string()
            })
        );
    }

    #[test]
    fn named_categories_accept_legacy_names() {
        let table = RangeTable::default();
        assert_eq!(table.evaluate_named(-9.5, "fiber-power"), Ok(Status::Warning));
        assert_eq!(table.evaluate_named(60.0, "alambrico"), Ok(Status::Ok));
        assert!(matches!(
            table.evaluate_named(50.0, "satellite"),
            Err(ClassifyError::UnknownCategory(_))
        ));
    }

    #[test]
    fn legacy_keys_and_kinds_classify() {
        let table = RangeTable::default();
        let values = bag(json!({ "alambrico_t2": 80.0 }));
        assert_eq!(classify(&table, "alambrico-t2", &values), Ok(Status::Failure));
        let values = bag(json!({ "potencia_tx": -12.0, "potencia_rx": -9.0 }));
        assert_eq!(classify(&table, "fibra", &values), Ok(Status::Warning));
    }

    #[test]
    fn classification_is_idempotent() {
        let table = RangeTable::default();
        let values = bag(json!({ "wifi_level": -77.5 }));
        let first = classify(&table, "wifi", &values);
        let second = classify(&table, "wifi", &values);
        assert_eq!(first, second);
        assert_eq!(first, Ok(Status::Warning));
    }

    #[test]
    fn custom_tables_substitute_cleanly() {
        let table = RangeTable::new(
            [
                (RangeCategory::Wired, Bounds::new(40.0, 80.0)),
                (RangeCategory::Coaxial, Bounds::new(50.0, 70.0)),
                (RangeCategory::FiberPower, Bounds::new(-25.0, -10.0)),
                (RangeCategory::Wifi, Bounds::new(-70.0, -40.0)),
            ],
            2.0,
        )
        .expect("valid table");
        assert_eq!(table.evaluate(47.0, RangeCategory::Coaxial), Status::Failure);
        assert_eq!(table.evaluate(47.0, RangeCategory::Wired), Status::Ok);
        assert_eq!(table.evaluate(51.0, RangeCategory::Coaxial), Status::Warning);
    }

    #[test]
    fn range_table_invariants_are_enforced() {
        let mut entries: Vec<_> = RangeCategory::ALL
            .iter()
            .map(|c| (*c, RangeTable::default().bounds(*c)))
            .collect();
        assert!(RangeTable::new(entries.clone(), 5.0).is_ok());
        assert!(matches!(
            RangeTable::new(entries.clone(), 11.0),
            Err(RangeTableError::MarginTooWide {
                category: RangeCategory::FiberPower,
                ..
            })
        ));
        assert!(matches!(
            RangeTable::new(entries.clone(), -1.0),
            Err(RangeTableError::InvalidMargin(_))
        ));
        // A zero margin would leave no WARNING band at all.
        assert_eq!(
            RangeTable::new(entries.clone(), 0.0),
            Err(RangeTableError::InvalidMargin(0.0))
        );
        assert!(RangeTable::new(entries.clone(), 0.5).is_ok());
        entries[0].1 = Bounds::new(75.0, 45.0);
        assert!(matches!(
            RangeTable::new(entries.clone(), 5.0),
            Err(RangeTableError::EmptyRange { .. })
        ));
        entries.remove(0);
        assert_eq!(
            RangeTable::new(entries, 5.0),
            Err(RangeTableError::MissingCategory(RangeCategory::Wired))
        );
    }

    #[test]
    fn default_table_is_valid() {
        let default = RangeTable::default();
        let rebuilt = RangeTable::new(
            RangeCategory::ALL.iter().map(|c| (*c, default.bounds(*c))),
            DEFAULT_WARNING_MARGIN,
        );
        assert_eq!(rebuilt, Ok(default));
    }
}
