//! Domain types for the Los Encinos buildout.
//!
//! Notes
//! - Enums serialize to the same strings that are stored in text columns
//!   (see `utils::serde_enum_name`). Spanish names used by the field client
//!   are accepted as aliases on input.
//! - Input structs (`*Input`, `*Patch`) carry the loosely typed payloads that
//!   arrive from the field client; `validation` turns them into checked values.

use crate::classifier::ClassifyError;
use crate::utils::parse_serde_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

// =====================
// Site structure
// =====================

/// Building identifier: a single uppercase ASCII letter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tower(char);

impl Tower {
    pub fn new(letter: char) -> Option<Self> {
        letter.is_ascii_uppercase().then_some(Tower(letter))
    }

    pub fn letter(self) -> char {
        self.0
    }
}

impl Display for Tower {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tower {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Tower::new(c.to_ascii_uppercase()).ok_or_else(|| format!("tower must be a letter, got {:?}", s))
            }
            _ => Err(format!("tower must be a single letter, got {:?}", s)),
        }
    }
}

impl TryFrom<String> for Tower {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tower> for String {
    fn from(value: Tower) -> Self {
        value.0.to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sector {
    Norte,
    Poniente,
    Oriente,
}

impl Sector {
    /// Unit numbers (the last two digits of a unit location) served by this sector.
    pub fn unit_numbers(self) -> std::ops::RangeInclusive<u8> {
        match self {
            Sector::Norte => 1..=6,
            Sector::Poniente => 7..=12,
            Sector::Oriente => 13..=18,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    #[serde(alias = "unidad")]
    Unit,
    Sotu,
    Shaft,
    Lateral,
    #[serde(alias = "antena")]
    Antenna,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Supervisor,
    #[serde(alias = "Tecnico")]
    Technician,
    #[serde(alias = "Ayudante")]
    Helper,
}

// =====================
// Measurements
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementKind {
    #[serde(alias = "alambrico-t1")]
    WiredT1,
    #[serde(alias = "alambrico-t2")]
    WiredT2,
    Coaxial,
    #[serde(alias = "fibra")]
    Fiber,
    Wifi,
    #[serde(alias = "certificacion")]
    Certification,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 6] = [
        MeasurementKind::WiredT1,
        MeasurementKind::WiredT2,
        MeasurementKind::Coaxial,
        MeasurementKind::Fiber,
        MeasurementKind::Wifi,
        MeasurementKind::Certification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementKind::WiredT1 => "wired-t1",
            MeasurementKind::WiredT2 => "wired-t2",
            MeasurementKind::Coaxial => "coaxial",
            MeasurementKind::Fiber => "fiber",
            MeasurementKind::Wifi => "wifi",
            MeasurementKind::Certification => "certification",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MeasurementKind::WiredT1 => "Wired T1",
            MeasurementKind::WiredT2 => "Wired T2",
            MeasurementKind::Coaxial => "Coaxial",
            MeasurementKind::Fiber => "Fiber optic",
            MeasurementKind::Wifi => "WiFi",
            MeasurementKind::Certification => "Certification",
        }
    }

    /// Unit the field crew reads the value in.
    pub fn unit(self) -> &'static str {
        match self {
            MeasurementKind::WiredT1 | MeasurementKind::WiredT2 | MeasurementKind::Coaxial => "dBμV",
            MeasurementKind::Fiber | MeasurementKind::Wifi => "dBm",
            MeasurementKind::Certification => "state",
        }
    }
}

impl Display for MeasurementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_serde_enum(s.trim()).ok_or_else(|| ClassifyError::UnknownKind(s.to_string()))
    }
}

/// Qualitative acceptability of a measurement. Ordered by severity so the
/// worst of several statuses is their maximum.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARNING", alias = "ADVERTENCIA")]
    Warning,
    #[serde(rename = "FAILURE", alias = "FALLA")]
    Failure,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Failure => "FAILURE",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_serde_enum(s.trim()).ok_or_else(|| format!("unknown measurement status {:?}", s))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificationState {
    #[serde(alias = "APROBADO")]
    Approved,
    #[serde(alias = "APROBADO_CON_OBSERVACIONES")]
    ApprovedWithObservations,
    #[serde(alias = "RECHAZADO")]
    Rejected,
}

impl FromStr for CertificationState {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_serde_enum(s.trim()).ok_or_else(|| ClassifyError::InvalidCertification(s.to_string()))
    }
}

/// A measurement payload with exactly the fields valid for its kind.
///
/// Wire form: `{"type": "<kind>", "values": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "kebab-case")]
pub enum Reading {
    #[serde(alias = "alambrico-t1")]
    WiredT1 {
        #[serde(alias = "alambrico_t1")]
        t1_level: f64,
    },
    #[serde(alias = "alambrico-t2")]
    WiredT2 {
        #[serde(alias = "alambrico_t2")]
        t2_level: f64,
    },
    Coaxial {
        #[serde(alias = "coaxial")]
        coax_level: f64,
    },
    #[serde(alias = "fibra")]
    Fiber {
        #[serde(default, alias = "potencia_tx", skip_serializing_if = "Option::is_none")]
        tx_power: Option<f64>,
        #[serde(default, alias = "potencia_rx", skip_serializing_if = "Option::is_none")]
        rx_power: Option<f64>,
        #[serde(default, alias = "atenuacion", skip_serializing_if = "Option::is_none")]
        attenuation: Option<f64>,
    },
    Wifi {
        #[serde(alias = "wifi")]
        wifi_level: f64,
    },
    #[serde(alias = "certificacion")]
    Certification {
        #[serde(alias = "certificacion")]
        certification_state: CertificationState,
    },
}

impl Reading {
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Reading::WiredT1 { .. } => MeasurementKind::WiredT1,
            Reading::WiredT2 { .. } => MeasurementKind::WiredT2,
            Reading::Coaxial { .. } => MeasurementKind::Coaxial,
            Reading::Fiber { .. } => MeasurementKind::Fiber,
            Reading::Wifi { .. } => MeasurementKind::Wifi,
            Reading::Certification { .. } => MeasurementKind::Certification,
        }
    }

    /// Build a typed reading from a kind and its stored `values` object.
    /// Missing required fields and non-numeric levels are rejected here.
    pub fn from_parts(kind: MeasurementKind, values: &Value) -> Result<Self, serde_json::Error> {
        let tagged = serde_json::json!({ "type": kind.as_str(), "values": values });
        serde_json::from_value(tagged)
    }

    /// The `values` object as persisted in the `readings` column.
    pub fn values_json(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("values").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

// =====================
// Aggregation inputs
// =====================

/// One progress entry as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub tower: Tower,
    pub percentage: u8,
    pub location: String,
    pub date: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn is_complete(&self) -> bool {
        self.percentage == 100
    }
}

/// One measurement as seen by the aggregator. `status` is the value persisted
/// at write time; the aggregator never recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub tower: Tower,
    pub status: Status,
    pub date: DateTime<Utc>,
}

// =====================
// Write payloads
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInput {
    pub date: DateTime<Utc>,
    pub tower: String,
    #[serde(default)]
    pub floor: Option<i32>,
    #[serde(default)]
    pub sector: Option<Sector>,
    pub space_type: SpaceType,
    pub location: String,
    pub category: String,
    pub percentage: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPatch {
    pub date: Option<DateTime<Utc>>,
    pub tower: Option<String>,
    pub floor: Option<i32>,
    pub sector: Option<Sector>,
    pub space_type: Option<SpaceType>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub percentage: Option<i32>,
    pub notes: Option<String>,
}

impl ProgressPatch {
    pub fn is_empty(&self) -> bool {
        *self == ProgressPatch::default()
    }
}

/// Measurement as captured by the field client. `values` stays an open JSON
/// object until validation turns it into a [`Reading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    pub date: DateTime<Utc>,
    pub tower: String,
    pub floor: i32,
    #[serde(alias = "identificador")]
    pub unit_id: String,
    #[serde(rename = "type", alias = "tipo_medicion")]
    pub kind: MeasurementKind,
    #[serde(alias = "valores")]
    pub values: Value,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPatch {
    pub date: Option<DateTime<Utc>>,
    pub tower: Option<String>,
    pub floor: Option<i32>,
    pub unit_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MeasurementKind>,
    pub values: Option<Value>,
    pub notes: Option<String>,
}

impl MeasurementPatch {
    pub fn is_empty(&self) -> bool {
        *self == MeasurementPatch::default()
    }

    /// Whether applying this patch invalidates the persisted status.
    pub fn touches_reading(&self) -> bool {
        self.kind.is_some() || self.values.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(alias = "nombre")]
    pub full_name: String,
    #[serde(alias = "rol")]
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == UserPatch::default()
    }
}
