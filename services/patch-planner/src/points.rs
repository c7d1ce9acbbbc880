//! Points CSV parsing.
//!
//! Rows are `id,longitude,latitude` or `longitude,latitude`. A header row
//! is allowed as the first record. Blank lines and lines starting with `#`
//! are skipped; fields may be quoted.

use anyhow::{bail, Context, Result};
use patch_extractor::GeoPoint;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read points from a CSV file.
pub fn load_points(path: &Path) -> Result<Vec<GeoPoint>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_points(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))
}

/// Parse points from CSV rows.
pub fn parse_points<R: Read>(reader: R) -> Result<Vec<GeoPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut points = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let fields: Vec<&str> = record.iter().collect();
        match parse_row(&fields) {
            Some(point) => points.push(point),
            None if index == 0 => {}
            None => {
                let line = record.position().map_or(index as u64 + 1, |p| p.line());
                bail!("line {line}: expected id,longitude,latitude or longitude,latitude")
            }
        }
    }

    Ok(points)
}

fn parse_row(fields: &[&str]) -> Option<GeoPoint> {
    match fields {
        [id, lon, lat] => {
            let (lon, lat) = (lon.parse().ok()?, lat.parse().ok()?);
            if id.is_empty() {
                Some(GeoPoint::from_coordinates(lon, lat))
            } else {
                Some(GeoPoint::new(*id, lon, lat))
            }
        }
        [lon, lat] => Some(GeoPoint::from_coordinates(lon.parse().ok()?, lat.parse().ok()?)),
        _ => None,
    }
}
