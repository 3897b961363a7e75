//! Diesel model structs for users, progress entries and measurements.
//!
//! Enum-valued columns are stored as text using the serde names of the enums
//! in `models::site`. `progress_entries` is soft-deleted via `deleted_at`;
//! every read filters it out.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::users)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: String,
    pub role: String,
    pub active: bool,
    pub last_access: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub full_name: String,
    pub role: String,
    pub active: bool,
}

/// `None` fields are left untouched by diesel.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::users)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::progress_entries)]
#[diesel(belongs_to(User))]
pub struct ProgressEntry {
    pub id: i64,
    pub site_id: String,
    pub recorded_at: DateTime<Utc>,
    pub tower: String,
    pub floor: Option<i32>,
    pub sector: Option<String>,
    pub space_type: String,
    pub location: String,
    pub category: String,
    pub percentage: i32,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::progress_entries)]
pub struct NewProgressEntry {
    pub site_id: String,
    pub recorded_at: DateTime<Utc>,
    pub tower: String,
    pub floor: Option<i32>,
    pub sector: Option<String>,
    pub space_type: String,
    pub location: String,
    pub category: String,
    pub percentage: i32,
    pub notes: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::progress_entries)]
pub struct ProgressChanges {
    pub recorded_at: Option<DateTime<Utc>>,
    pub tower: Option<String>,
    pub floor: Option<i32>,
    pub sector: Option<String>,
    pub space_type: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub percentage: Option<i32>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::measurements)]
#[diesel(belongs_to(User))]
pub struct Measurement {
    pub id: i64,
    pub site_id: String,
    pub recorded_at: DateTime<Utc>,
    pub tower: String,
    pub floor: i32,
    pub unit_id: String,
    pub kind: String,
    pub readings: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::measurements)]
pub struct NewMeasurement {
    pub site_id: String,
    pub recorded_at: DateTime<Utc>,
    pub tower: String,
    pub floor: i32,
    pub unit_id: String,
    pub kind: String,
    pub readings: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::measurements)]
pub struct MeasurementChanges {
    pub recorded_at: Option<DateTime<Utc>>,
    pub tower: Option<String>,
    pub floor: Option<i32>,
    pub unit_id: Option<String>,
    pub kind: Option<String>,
    pub readings: Option<serde_json::Value>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
