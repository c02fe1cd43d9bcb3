//! Node tables, statistics and GeoJSON written alongside the coverage raster.

use std::{fs, path::Path};

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{io_at, Result},
    height::{HeightStats, ResolvedObserver},
    nodes::{IngestStats, RejectedRecord},
};

/// Ingestion and height statistics, as one flat object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeStats {
    #[serde(flatten)]
    pub ingest: IngestStats,
    #[serde(flatten)]
    pub height: HeightStats,
}

const CLEAN_COLUMNS: [&str; 9] = [
    "id",
    "name",
    "lat",
    "lon",
    "height_input_m",
    "height_min_required_m",
    "height_fresnel_margin_m",
    "height_used_m",
    "ground_elev_m",
];

const REJECTED_COLUMNS: [&str; 7] = ["row", "reason", "id", "name", "lat", "lon", "height"];

/// Extra columns carried through from the input, in order of first
/// appearance, skipping any that would repeat a fixed column.
fn metadata_columns<'a>(
    rows: impl Iterator<Item = &'a [(String, String)]>,
    fixed: &[&str],
) -> Vec<&'a str> {
    let mut columns: Vec<&'a str> = Vec::new();
    for (key, _) in rows.flatten() {
        let key = key.as_str();
        if !fixed.contains(&key) && !columns.contains(&key) {
            columns.push(key);
        }
    }
    columns
}

/// Values of `columns` for one row, empty where the row has none.
fn metadata_fields(metadata: &[(String, String)], columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            metadata
                .iter()
                .find(|(key, _)| key == column)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .collect()
}

fn number(value: f64) -> String {
    format!("{:?}", value)
}

/// Creates the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_at(parent))
        }
        _ => Ok(()),
    }
}

/// Cleaned node table with resolved heights, in node order, followed by
/// any extra input columns.
pub fn write_clean_csv(path: &Path, observers: &[ResolvedObserver]) -> Result<()> {
    ensure_parent(path)?;
    let extra = metadata_columns(
        observers.iter().map(|observer| observer.node.metadata.as_slice()),
        &CLEAN_COLUMNS,
    );

    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = CLEAN_COLUMNS.to_vec();
    header.extend(&extra);
    writer.write_record(&header)?;
    for observer in observers {
        let node = &observer.node;
        let mut record = vec![
            node.id.clone(),
            node.name.clone(),
            number(node.lat()),
            number(node.lon()),
            number(observer.input_height_m),
            number(observer.min_required_height_m),
            number(observer.fresnel_margin_m),
            number(observer.used_height_m),
            observer.ground_elev_m.map(number).unwrap_or_default(),
        ];
        record.extend(metadata_fields(&node.metadata, &extra));
        writer.write_record(&record)?;
    }
    writer.flush().map_err(io_at(path))?;
    log::info!("{} node(s) written to {:?}", observers.len(), path);
    Ok(())
}

/// Dropped rows with their original text and reason, followed by any extra
/// input columns.
pub fn write_rejected_csv(path: &Path, rejected: &[RejectedRecord]) -> Result<()> {
    ensure_parent(path)?;
    let extra = metadata_columns(
        rejected.iter().map(|rejected| rejected.record.metadata.as_slice()),
        &REJECTED_COLUMNS,
    );

    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = REJECTED_COLUMNS.to_vec();
    header.extend(&extra);
    writer.write_record(&header)?;
    for rejected in rejected {
        let record = &rejected.record;
        let text = |field: &Option<String>| field.clone().unwrap_or_default();
        let mut row = vec![
            record.row.to_string(),
            rejected.reason.as_str().to_string(),
            text(&record.id),
            text(&record.name),
            text(&record.lat),
            text(&record.lon),
            text(&record.height),
        ];
        row.extend(metadata_fields(&record.metadata, &extra));
        writer.write_record(&row)?;
    }
    writer.flush().map_err(io_at(path))?;
    log::info!("{} rejected row(s) written to {:?}", rejected.len(), path);
    Ok(())
}

/// Writes any serialisable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(io_at(path))
}

/// FeatureCollection of every node, with its heights and extra input
/// columns as properties.
pub fn nodes_geojson(observers: &[ResolvedObserver]) -> Value {
    let features: Vec<Value> = observers
        .iter()
        .map(|observer| {
            let mut feature = json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [observer.node.lon(), observer.node.lat()],
                },
                "properties": {
                    "id": observer.node.id,
                    "name": observer.node.name,
                    "height_m": observer.used_height_m,
                    "height_input_m": observer.input_height_m,
                    "height_min_required_m": observer.min_required_height_m,
                    "ground_elev_m": observer.ground_elev_m,
                },
            });
            if let Some(properties) = feature["properties"].as_object_mut() {
                for (key, value) in &observer.node.metadata {
                    properties
                        .entry(key.clone())
                        .or_insert_with(|| Value::String(value.clone()));
                }
            }
            feature
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

pub fn write_nodes_geojson(path: &Path, observers: &[ResolvedObserver]) -> Result<()> {
    write_json(path, &nodes_geojson(observers))?;
    log::info!("{} node feature(s) written to {:?}", observers.len(), path);
    Ok(())
}
