//! Node ingestion and validation.
//!
//! Raw rows go through a fixed sequence of checks; every row removed along
//! the way is kept, untouched, as a [`RejectedRecord`] so that nothing is
//! lost silently. Surviving nodes keep their relative input order.

use std::{collections::HashSet, path::Path};

use geo::Point;
use serde::Serialize;

use crate::{config::ValidationConfig, error::Result};

pub mod schema;

pub use schema::{load_records, NodeSchema};

/// One row of a node file, as text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawNodeRecord {
    /// 1-based position among the data rows of the input.
    pub row: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub height: Option<String>,

    /// Columns with no known meaning, by normalised column name.
    pub metadata: Vec<(String, String)>,
}

/// A node with a usable identifier and position.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedNode {
    pub id: String,
    pub name: String,

    /// Longitude (x) and latitude (y), WGS84 degrees.
    pub position: Point<f64>,

    /// Antenna height as supplied, if it was a number.
    pub height_m: Option<f64>,
    pub row: usize,
    pub metadata: Vec<(String, String)>,
}

impl ValidatedNode {
    pub fn lat(&self) -> f64 {
        self.position.y()
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Identifier, latitude or longitude absent or not a finite number.
    Unparseable,
    EmptyId,
    InvalidRange,
    ZeroCoords,
    DuplicateId,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Unparseable => "unparseable",
            RejectReason::EmptyId => "empty_id",
            RejectReason::InvalidRange => "invalid_range",
            RejectReason::ZeroCoords => "zero_coords",
            RejectReason::DuplicateId => "duplicate_id",
        }
    }
}

/// A dropped row and why it was dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedRecord {
    pub reason: RejectReason,
    pub record: RawNodeRecord,
}

/// Row counts of one ingestion. Drop counters only count rows actually
/// removed, so `rows_valid` plus every `rows_dropped_*` is `rows_input`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows_input: usize,
    pub rows_dropped_nan: usize,
    pub rows_dropped_empty_id: usize,
    pub rows_dropped_invalid_range: usize,
    pub rows_dropped_zero_coords: usize,
    pub rows_dropped_duplicate_id: usize,
    pub rows_valid: usize,
}

impl IngestStats {
    pub fn rows_dropped(&self) -> usize {
        self.rows_dropped_nan
            + self.rows_dropped_empty_id
            + self.rows_dropped_invalid_range
            + self.rows_dropped_zero_coords
            + self.rows_dropped_duplicate_id
    }
}

/// Result of ingesting a node file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ingest {
    pub nodes: Vec<ValidatedNode>,
    pub stats: IngestStats,

    /// Dropped rows, in input order.
    pub rejected: Vec<RejectedRecord>,
}

/// Reads a node file and validates its rows.
pub fn ingest(path: &Path, validation: &ValidationConfig) -> Result<Ingest> {
    let records = load_records(path)?;
    Ok(validate(records, validation))
}

/// A row that made it through parsing.
struct Parsed {
    id: String,
    lat: f64,
    lon: f64,
    record: RawNodeRecord,
}

fn parse_number(text: &Option<String>) -> Option<f64> {
    text.as_deref()
        .and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Runs the validation pipeline over raw rows.
pub fn validate(records: Vec<RawNodeRecord>, validation: &ValidationConfig) -> Ingest {
    let mut stats = IngestStats {
        rows_input: records.len(),
        ..IngestStats::default()
    };
    let mut rejected = Vec::new();

    let mut parsed = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id.as_deref().map(|id| id.trim().to_string());
        match (id, parse_number(&record.lat), parse_number(&record.lon)) {
            (Some(id), Some(lat), Some(lon)) => parsed.push(Parsed {
                id,
                lat,
                lon,
                record,
            }),
            _ => rejected.push(RejectedRecord {
                reason: RejectReason::Unparseable,
                record,
            }),
        }
    }
    stats.rows_dropped_nan = rejected.len();
    log::info!("dropped {} row(s) with unparseable id/lat/lon", stats.rows_dropped_nan);

    stats.rows_dropped_empty_id = drop_where(
        &mut parsed,
        &mut rejected,
        RejectReason::EmptyId,
        |p| p.id.is_empty(),
    );
    log::info!("dropped {} row(s) with an empty id", stats.rows_dropped_empty_id);

    if validation.drop_invalid_coords {
        stats.rows_dropped_invalid_range = drop_where(
            &mut parsed,
            &mut rejected,
            RejectReason::InvalidRange,
            |p| !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon),
        );
        log::info!(
            "dropped {} row(s) with out-of-range coordinates",
            stats.rows_dropped_invalid_range
        );
    }

    if validation.drop_zero_coords {
        stats.rows_dropped_zero_coords = drop_where(
            &mut parsed,
            &mut rejected,
            RejectReason::ZeroCoords,
            |p| p.lat == 0.0 && p.lon == 0.0,
        );
        log::info!(
            "dropped {} row(s) at (0, 0)",
            stats.rows_dropped_zero_coords
        );
    }

    if validation.dedupe_by_id {
        let (kept, duplicates) = first_by_id(parsed, |p| &p.id);
        parsed = kept;
        stats.rows_dropped_duplicate_id = duplicates.len();
        rejected.extend(duplicates.into_iter().map(|p| RejectedRecord {
            reason: RejectReason::DuplicateId,
            record: p.record,
        }));
        log::info!(
            "dropped {} row(s) with a duplicate id",
            stats.rows_dropped_duplicate_id
        );
    }

    let nodes: Vec<ValidatedNode> = parsed.into_iter().map(into_node).collect();
    stats.rows_valid = nodes.len();
    rejected.sort_by_key(|r| r.record.row);
    log::info!(
        "{} of {} node row(s) valid",
        stats.rows_valid,
        stats.rows_input
    );

    Ingest {
        nodes,
        stats,
        rejected,
    }
}

/// Moves the rows matching `predicate` to `rejected`, keeping order.
fn drop_where<F>(
    parsed: &mut Vec<Parsed>,
    rejected: &mut Vec<RejectedRecord>,
    reason: RejectReason,
    predicate: F,
) -> usize
where
    F: Fn(&Parsed) -> bool,
{
    let before = rejected.len();
    let (dropped, kept): (Vec<Parsed>, Vec<Parsed>) =
        parsed.drain(..).partition(|p| predicate(p));
    *parsed = kept;
    rejected.extend(dropped.into_iter().map(|p| RejectedRecord {
        reason,
        record: p.record,
    }));
    rejected.len() - before
}

fn into_node(parsed: Parsed) -> ValidatedNode {
    let Parsed {
        id,
        lat,
        lon,
        record,
    } = parsed;
    let name = record
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&id)
        .to_string();

    ValidatedNode {
        height_m: parse_number(&record.height),
        position: Point::new(lon, lat),
        row: record.row,
        metadata: record.metadata,
        name,
        id,
    }
}

/// Keeps the first item of every identifier, in order.
///
/// Returns the kept items and the removed ones.
fn first_by_id<T, F>(items: Vec<T>, id: F) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> &String,
{
    let mut seen = HashSet::with_capacity(items.len());
    let (mut kept, mut duplicates) = (Vec::with_capacity(items.len()), Vec::new());
    for item in items {
        if seen.insert(id(&item).clone()) {
            kept.push(item);
        } else {
            duplicates.push(item);
        }
    }
    (kept, duplicates)
}
