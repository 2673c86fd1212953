//! Audit-trail records for each market's provider response.
//!
//! Every snapshot the provider returned is archived, independent of
//! eligibility. The content hash is a deterministic fingerprint of the
//! serialized payload; later stages use it to attach the generated archive
//! row id to derived property/event/period rows within the same run. It is
//! not a cross-run dedup key: re-running a date range inserts new rows.

use crate::models::{PropertySnapshot, RawResponseRecord};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Computes the SHA-256 fingerprint of a JSON payload (hex encoded).
pub fn content_hash(payload: &Value) -> String {
    let serialized = payload.to_string();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Forms one `RawResponseRecord` per snapshot in a market response.
pub fn build_archive_records(
    snapshots: &[PropertySnapshot],
    provider_endpoint: &str,
    request_params: Value,
    response_status: i32,
    session_id: Uuid,
) -> Vec<RawResponseRecord> {
    snapshots
        .iter()
        .map(|snapshot| {
            let raw_payload =
                serde_json::to_value(snapshot).unwrap_or_else(|_| Value::Null);
            RawResponseRecord {
                content_hash: content_hash(&raw_payload),
                provider_endpoint: provider_endpoint.to_string(),
                request_params: request_params.clone(),
                raw_payload,
                response_status,
                session_id,
                target_property_id: snapshot.parcl_property_id,
            }
        })
        .collect()
}
