//! # Asset Record Model
//!
//! Canonical shape of a tracked asset as seen by the client, plus the
//! derived display classification and aggregate counters.
//!
//! ## Fixed-Point Coordinates
//!
//! The ledger stores latitude/longitude as integers scaled by
//! [`COORD_SCALE`]. Encoding rounds to the nearest integer, decoding divides.
//! Decoded values re-encode to the same stored integer.
//!
//! ## Status Derivation
//!
//! ```text
//! is_verified ──────────────────────────────▶ Delivered
//! !is_verified && age >  alert_after_secs ──▶ Alert
//! !is_verified && age <= alert_after_secs ──▶ InTransit
//! ```
//!
//! Derivation is a pure function of record fields and an explicit `now`.

use std::fmt;

use serde::Serialize;

use crate::engine::Handle;
use crate::ledger::{Address, BusinessData};

// ════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ════════════════════════════════════════════════════════════════════════════

/// Scale factor between decoded coordinates and their on-chain integers.
pub const COORD_SCALE: f64 = 1_000_000.0;

// ════════════════════════════════════════════════════════════════════════════
// FIXED-POINT HELPERS
// ════════════════════════════════════════════════════════════════════════════

/// Encodes a coordinate into its on-chain fixed-point integer.
///
/// Returns `None` for non-finite input or when the scaled value does not
/// fit in `i64`.
pub fn to_fixed(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = (value * COORD_SCALE).round();
    if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return None;
    }
    Some(scaled as i64)
}

/// Decodes an on-chain fixed-point integer back into a coordinate.
pub fn from_fixed(raw: i64) -> f64 {
    raw as f64 / COORD_SCALE
}

// ════════════════════════════════════════════════════════════════════════════
// ASSET STATUS
// ════════════════════════════════════════════════════════════════════════════

/// Display classification of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    InTransit,
    Delivered,
    Alert,
}

impl AssetStatus {
    /// Derives the classification from ledger facts.
    ///
    /// A timestamp in the future counts as age zero.
    pub fn derive(is_verified: bool, timestamp: u64, now: u64, alert_after_secs: u64) -> Self {
        if is_verified {
            return AssetStatus::Delivered;
        }
        if now.saturating_sub(timestamp) > alert_after_secs {
            AssetStatus::Alert
        } else {
            AssetStatus::InTransit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::InTransit => "in_transit",
            AssetStatus::Delivered => "delivered",
            AssetStatus::Alert => "alert",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ASSET RECORD
// ════════════════════════════════════════════════════════════════════════════

/// One tracked asset, normalized from [`BusinessData`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Decoded latitude (degrees).
    pub latitude: f64,
    /// Decoded longitude (degrees).
    pub longitude: f64,
    /// Stored fixed-point latitude.
    pub latitude_raw: i64,
    /// Stored fixed-point longitude.
    pub longitude_raw: i64,
    pub creator: Address,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u64,
    pub encrypted_value_handle: Handle,
    pub is_verified: bool,
    /// Authoritative only when `is_verified` is true; `None` otherwise.
    pub decrypted_value: Option<u64>,
    pub status: AssetStatus,
}

impl AssetRecord {
    /// Normalizes a ledger record.
    ///
    /// `decrypted_value` is dropped unless the ledger marks the record verified.
    pub fn from_ledger(id: &str, data: &BusinessData, now: u64, alert_after_secs: u64) -> Self {
        let decrypted_value = if data.is_verified {
            Some(data.decrypted_value)
        } else {
            None
        };

        Self {
            id: id.to_string(),
            name: data.name.clone(),
            description: data.description.clone(),
            latitude: from_fixed(data.public_value1),
            longitude: from_fixed(data.public_value2),
            latitude_raw: data.public_value1,
            longitude_raw: data.public_value2,
            creator: data.creator,
            timestamp: data.timestamp,
            encrypted_value_handle: data.encrypted_value,
            is_verified: data.is_verified,
            decrypted_value,
            status: AssetStatus::derive(data.is_verified, data.timestamp, now, alert_after_secs),
        }
    }

    /// Case-insensitive match on name or description.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AGGREGATE COUNTERS
// ════════════════════════════════════════════════════════════════════════════

/// Per-status counts over one snapshot.
///
/// Invariant: `in_transit + delivered + alerts == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounters {
    pub total: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub alerts: usize,
}

impl AggregateCounters {
    pub fn from_records(records: &[AssetRecord]) -> Self {
        let mut counters = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.status {
                AssetStatus::InTransit => counters.in_transit += 1,
                AssetStatus::Delivered => counters.delivered += 1,
                AssetStatus::Alert => counters.alerts += 1,
            }
        }
        counters
    }

    /// True when the per-status counts add up to the total.
    pub fn is_consistent(&self) -> bool {
        self.in_transit + self.delivered + self.alerts == self.total
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
