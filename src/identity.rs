//! Trip identity resolution.
//!
//! Realtime feeds report the same physical run under trip ids whose suffixes
//! drift between polls. The resolved identity keeps only the origin code
//! prefix of the raw id and hashes it together with the service date, route
//! and direction, so every poll of one run lands on one `trip_uid`.

use std::borrow::Cow;

use chrono::NaiveDate;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref ORIGIN_CODE: Regex =
        Regex::new(r"^[+-]?[0-9]{1,8}").expect("origin code pattern is valid");
}

/// Resolved identity of one real-world trip run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TripIdentity {
    /// Hex-encoded SHA-256 of `trip_key`.
    pub trip_uid: String,
    /// Human-readable canonical key, useful for debugging and joins.
    pub trip_key: String,
}

/// Extracts the origin code: an optionally signed run of 1 to 8 leading
/// digits, or the whole raw id when it does not start with one.
pub fn origin_code(raw_trip_id: &str) -> &str {
    ORIGIN_CODE
        .find(raw_trip_id)
        .map(|m| m.as_str())
        .unwrap_or(raw_trip_id)
}

/// Canonicalizes `YYYYMMDD` and `YYYY-MM-DD` to `YYYY-MM-DD`. Anything else
/// is kept verbatim (trimmed).
pub fn normalize_service_date(raw: &str) -> String {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn escape(component: &str) -> Cow<'_, str> {
    if component.contains(['\\', '|']) {
        Cow::Owned(component.replace('\\', "\\\\").replace('|', "\\|"))
    } else {
        Cow::Borrowed(component)
    }
}

/// Builds `service_date|route_id|direction_id|origin_code`.
///
/// Components are escaped, so a `|` inside a field can never shift a
/// boundary and make two different tuples produce the same key.
pub fn canonical_key(
    service_date: &str,
    route_id: &str,
    direction_id: &str,
    origin_code: &str,
) -> String {
    [service_date, route_id, direction_id, origin_code]
        .into_iter()
        .map(escape)
        .join("|")
}

/// Resolves the identity of a trip. Pure: identical inputs from any poll
/// always produce the identical identity.
pub fn resolve(
    service_date: &str,
    route_id: &str,
    direction_id: &str,
    raw_trip_id: &str,
) -> TripIdentity {
    let trip_key = canonical_key(service_date, route_id, direction_id, origin_code(raw_trip_id));
    let trip_uid = hex::encode(Sha256::digest(trip_key.as_bytes()));
    TripIdentity { trip_uid, trip_key }
}
