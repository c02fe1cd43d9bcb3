//! Reading node records from CSV or JSON files of varying shapes.
//!
//! Upstream feeds name their columns differently and sometimes drop the
//! header row altogether. Whatever the shape, columns are matched once
//! against alias lists and every row comes out as a [`RawNodeRecord`].

use std::{
    fs,
    io::{BufRead, BufReader},
    path::Path,
};

use serde_json::Value;

use super::RawNodeRecord;
use crate::error::{io_at, Error, Result};

pub const ID_ALIASES: &[&str] = &["id", "node_id"];
pub const NAME_ALIASES: &[&str] = &["name", "long_name", "short_name"];
pub const LAT_ALIASES: &[&str] = &["lat", "latitude"];
pub const LON_ALIASES: &[&str] = &["lon", "lng", "longitude"];
pub const HEIGHT_ALIASES: &[&str] = &["height_m", "height", "antenna_height_m", "observer_height_m"];

/// Column layout of the node feed's headerless CSV export.
pub const HEADERLESS_COLUMNS: &[&str] = &["id", "name", "lat", "lon", "type", "last_heard_at"];

/// Positions of the known fields among a set of columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSchema {
    pub id: usize,
    pub name: Option<usize>,
    pub lat: usize,
    pub lon: usize,
    pub height: Option<usize>,

    /// Every column, normalised (trimmed, lowercase).
    pub columns: Vec<String>,
}

impl NodeSchema {
    /// Matches column names against the alias lists.
    ///
    /// Missing identifier, latitude or longitude columns are fatal.
    pub fn match_columns<S: AsRef<str>>(columns: &[S], path: &Path) -> Result<Self> {
        let columns: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref().trim().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| columns.iter().position(|c| c == alias))
        };

        let (id, lat, lon) = (find(ID_ALIASES), find(LAT_ALIASES), find(LON_ALIASES));
        let (name, height) = (find(NAME_ALIASES), find(HEIGHT_ALIASES));
        let missing: Vec<&'static str> = [("id", id), ("lat", lat), ("lon", lon)]
            .iter()
            .filter(|(_, found)| found.is_none())
            .map(|(name, _)| *name)
            .collect();

        match (id, lat, lon) {
            (Some(id), Some(lat), Some(lon)) => Ok(Self {
                id,
                name,
                lat,
                lon,
                height,
                columns,
            }),
            _ => Err(Error::MissingColumns {
                path: path.to_path_buf(),
                missing,
            }),
        }
    }

    fn is_known(&self, index: usize) -> bool {
        index == self.id
            || index == self.lat
            || index == self.lon
            || Some(index) == self.name
            || Some(index) == self.height
    }

    /// Builds a record from the fields of one row, in column order.
    ///
    /// Fields beyond the row's end are absent; blank fields count as absent,
    /// except the identifier, which is kept so that a blank one is reported
    /// as empty rather than unparseable.
    pub fn record<F>(&self, row: usize, field: F) -> RawNodeRecord
    where
        F: Fn(usize) -> Option<String>,
    {
        let get = |index: usize| field(index).filter(|v| !v.trim().is_empty());
        let metadata = (0..self.columns.len())
            .filter(|&i| !self.is_known(i))
            .filter_map(|i| get(i).map(|v| (self.columns[i].clone(), v)))
            .collect();

        RawNodeRecord {
            row,
            id: field(self.id),
            name: self.name.and_then(get),
            lat: get(self.lat),
            lon: get(self.lon),
            height: self.height.and_then(get),
            metadata,
        }
    }
}

/// Loads every row of a node file, JSON by extension, CSV otherwise.
pub fn load_records(path: &Path) -> Result<Vec<RawNodeRecord>> {
    if !path.exists() {
        return Err(Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "node file not found"),
        });
    }

    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let records = if is_json {
        load_json(path)?
    } else {
        load_csv(path)?
    };
    log::info!("read {} node row(s) from {:?}", records.len(), path);
    Ok(records)
}

/// The first line is a header when it mentions `id`, `lat` and `lon`.
fn has_header(path: &Path) -> Result<bool> {
    let file = fs::File::open(path).map_err(io_at(path))?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .map_err(io_at(path))?;
    let first_line = first_line.to_lowercase();
    Ok(["id", "lat", "lon"].iter().all(|k| first_line.contains(k)))
}

fn load_csv(path: &Path) -> Result<Vec<RawNodeRecord>> {
    let header = has_header(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(header)
        .flexible(true)
        .from_path(path)?;

    let schema = if header {
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        NodeSchema::match_columns(&headers, path)?
    } else {
        log::debug!("{:?} has no header row, assuming {:?}", path, HEADERLESS_COLUMNS);
        NodeSchema::match_columns(HEADERLESS_COLUMNS, path)?
    };

    // Data rows are numbered from 1, after the header if any.
    reader
        .records()
        .enumerate()
        .map(|(i, record)| -> Result<RawNodeRecord> {
            let record = record?;
            Ok(schema.record(i + 1, |index| record.get(index).map(String::from)))
        })
        .collect()
}

fn load_json(path: &Path) -> Result<Vec<RawNodeRecord>> {
    let text = fs::read_to_string(path).map_err(io_at(path))?;
    let document: Value = serde_json::from_str(&text)?;
    let nodes = match document.get("nodes") {
        Some(Value::Array(nodes)) => nodes.as_slice(),
        Some(_) => {
            return Err(Error::MalformedNodes {
                path: path.to_path_buf(),
                reason: "key `nodes` must hold an array".into(),
            })
        }
        None => &[][..],
    };

    // Columns are the union of keys, in order of first appearance.
    let mut keys: Vec<String> = Vec::new();
    for node in nodes {
        if let Value::Object(fields) = node {
            for key in fields.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
    }
    let schema = NodeSchema::match_columns(&keys, path)?;

    Ok(nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            schema.record(i + 1, |index| {
                node.get(keys[index].as_str()).and_then(json_text)
            })
        })
        .collect())
}

/// Text form of a JSON scalar, as a CSV cell would hold it.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
