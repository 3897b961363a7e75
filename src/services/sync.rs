//! Ingestion of the field client's offline queue.
//!
//! The client stores captures made without connectivity as queued items and
//! uploads them later as one JSON array. Items are applied one by one through
//! the regular write path; a bad item is reported and never aborts the batch.

use crate::config::SiteConfig;
use crate::models::site::{MeasurementInput, MeasurementPatch, ProgressInput, ProgressPatch};
use crate::services::{measurements, progress};
use diesel::PgConnection;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Items that already failed this many times are not retried.
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    #[serde(alias = "avance")]
    Progress,
    #[serde(alias = "medicion")]
    Measurement,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    #[default]
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueuedItem {
    /// Client-generated identifier, echoed back in the report.
    pub id: String,
    #[serde(alias = "type")]
    pub kind: QueueKind,
    #[serde(default)]
    pub action: QueueAction,
    /// Server id of the record targeted by updates and deletes.
    #[serde(default, alias = "itemId")]
    pub item_id: Option<i64>,
    #[serde(default, alias = "data")]
    pub payload: Value,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, alias = "userId")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncedItem {
    pub id: String,
    pub record_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub id: String,
    /// Attempts including this one.
    pub attempts: u32,
    pub reason: String,
    /// No further retries should be made.
    pub exhausted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub synced: Vec<SyncedItem>,
    pub failed: Vec<FailedItem>,
}

/// Decode an uploaded queue; errors name the offending JSON path.
pub fn parse_batch(json: &str) -> Result<Vec<QueuedItem>, String> {
    let de = &mut serde_json::Deserializer::from_str(json);
    serde_path_to_error::deserialize(de).map_err(|e| format!("invalid sync batch: {}", e))
}

fn decode_payload<T: DeserializeOwned>(item: &QueuedItem) -> Result<T, String> {
    serde_path_to_error::deserialize(item.payload.clone()).map_err(|e| format!("invalid payload: {}", e))
}

fn target_id(item: &QueuedItem) -> Result<i64, String> {
    item.item_id
        .ok_or_else(|| format!("{:?} needs itemId", item.action))
}

/// Apply every item with `apply`, collecting per-item outcomes.
pub fn process_batch(
    items: &[QueuedItem],
    mut apply: impl FnMut(&QueuedItem) -> Result<i64, String>,
) -> SyncReport {
    let mut report = SyncReport::default();
    for item in items {
        if item.attempts >= MAX_SYNC_ATTEMPTS {
            report.failed.push(FailedItem {
                id: item.id.clone(),
                attempts: item.attempts,
                reason: format!("gave up after {} attempts", item.attempts),
                exhausted: true,
            });
            continue;
        }
        match apply(item) {
            Ok(record_id) => report.synced.push(SyncedItem {
                id: item.id.clone(),
                record_id,
            }),
            Err(reason) => {
                let attempts = item.attempts + 1;
                warn!("Sync: item {} ({:?} {:?}) failed: {}", item.id, item.action, item.kind, reason);
                report.failed.push(FailedItem {
                    id: item.id.clone(),
                    attempts,
                    reason,
                    exhausted: attempts >= MAX_SYNC_ATTEMPTS,
                });
            }
        }
    }
    report
}

fn apply_item(conn: &mut PgConnection, site: &SiteConfig, item: &QueuedItem) -> Result<i64, String> {
    match (item.kind, item.action) {
        (QueueKind::Progress, QueueAction::Create) => {
            let input: ProgressInput = decode_payload(item)?;
            progress::create(conn, site, &input, item.user_id).map(|e| e.id)
        }
        (QueueKind::Progress, QueueAction::Update) => {
            let id = target_id(item)?;
            let patch: ProgressPatch = decode_payload(item)?;
            progress::update(conn, site, id, &patch)?
                .map(|e| e.id)
                .ok_or_else(|| format!("progress {} not found", id))
        }
        (QueueKind::Progress, QueueAction::Delete) => {
            let id = target_id(item)?;
            match progress::delete(conn, site, id)? {
                true => Ok(id),
                false => Err(format!("progress {} not found", id)),
            }
        }
        (QueueKind::Measurement, QueueAction::Create) => {
            let input: MeasurementInput = decode_payload(item)?;
            measurements::create(conn, site, &input, item.user_id).map(|m| m.id)
        }
        (QueueKind::Measurement, QueueAction::Update) => {
            let id = target_id(item)?;
            let patch: MeasurementPatch = decode_payload(item)?;
            measurements::update(conn, site, id, &patch)?
                .map(|m| m.id)
                .ok_or_else(|| format!("measurement {} not found", id))
        }
        (QueueKind::Measurement, QueueAction::Delete) => {
            let id = target_id(item)?;
            match measurements::delete(conn, site, id)? {
                true => Ok(id),
                false => Err(format!("measurement {} not found", id)),
            }
        }
    }
}

pub fn sync_batch(conn: &mut PgConnection, site: &SiteConfig, items: &[QueuedItem]) -> SyncReport {
    info!("Sync: processing {} queued item(s)", items.len());
    let report = process_batch(items, |item| apply_item(conn, site, item));
    info!(
        "Sync: complete (synced={}, failed={})",
        report.synced.len(),
        report.failed.len()
    );
    report
}
