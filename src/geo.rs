//! Joining recipient totals to a geographic reference.
//!
//! Two reference shapes are supported: a plain name → coordinate table, and a
//! GeoJSON boundary document whose features are matched by a name property.
//! Either way a recipient without a match is left out of the geographic
//! output only; it is never an error.

use crate::error::{LoadError, Result};
use crate::types::RankedTotal;
use csv::ReaderBuilder;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tabled::Tabled;

use crate::util::display_usd;

/// Representative point for one recipient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

pub trait GeoReference {
    /// Exact, case-sensitive lookup by recipient name.
    fn locate(&self, recipient: &str) -> Option<GeoLocation>;

    /// Region identifier to report alongside the point, if the reference has one.
    fn region(&self, _recipient: &str) -> Option<String> {
        None
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct GeoPoint {
    #[serde(rename = "Recipient")]
    #[tabled(rename = "Recipient")]
    pub recipient: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value", display_with = "display_usd")]
    pub value: f64,
    #[serde(rename = "Latitude")]
    #[tabled(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    #[tabled(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Region")]
    #[tabled(skip)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoJoin {
    pub points: Vec<GeoPoint>,
    /// Recipients that had no entry in the reference.
    pub misses: Vec<String>,
}

/// Left-join recipient totals onto `reference`, dropping recipients it lacks.
pub fn join(totals: &[RankedTotal], reference: &dyn GeoReference) -> GeoJoin {
    let mut out = GeoJoin::default();
    for t in totals {
        match reference.locate(&t.name) {
            Some(loc) => out.points.push(GeoPoint {
                recipient: t.name.clone(),
                value: t.value,
                latitude: loc.latitude,
                longitude: loc.longitude,
                region: reference.region(&t.name),
            }),
            None => {
                debug!("no geographic match for recipient '{}'", t.name);
                out.misses.push(t.name.clone());
            }
        }
    }
    if !out.misses.is_empty() {
        info!(
            "{} recipient(s) left off the map: no geographic match",
            out.misses.len()
        );
    }
    out
}

/// Recipient name → (latitude, longitude) table.
#[derive(Debug, Clone, Default)]
pub struct CoordinateReference {
    points: HashMap<String, GeoLocation>,
}

const NAME_COLUMNS: &[&str] = &["recipient", "name", "country"];
const LAT_COLUMNS: &[&str] = &["latitude", "lat"];
const LON_COLUMNS: &[&str] = &["longitude", "lon", "lng"];

impl CoordinateReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, latitude: f64, longitude: f64) {
        self.points.insert(name.into(), GeoLocation { latitude, longitude });
    }

    pub fn from_reader<R: Read>(source: &str, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| names.iter().find_map(|n| headers.iter().position(|h| h == n));
        let (name_idx, lat_idx, lon_idx) = match (find(NAME_COLUMNS), find(LAT_COLUMNS), find(LON_COLUMNS)) {
            (Some(n), Some(la), Some(lo)) => (n, la, lo),
            (n, la, lo) => {
                let mut columns = Vec::new();
                if n.is_none() {
                    columns.push(NAME_COLUMNS[0].to_string());
                }
                if la.is_none() {
                    columns.push(LAT_COLUMNS[0].to_string());
                }
                if lo.is_none() {
                    columns.push(LON_COLUMNS[0].to_string());
                }
                return Err(LoadError::MissingColumns {
                    source_name: source.to_string(),
                    columns,
                });
            }
        };

        let mut reference = CoordinateReference::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let record = match result {
                Ok(r) => r,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let name = record.get(name_idx).map(str::trim).unwrap_or("");
            let lat = record.get(lat_idx).and_then(|v| v.trim().parse::<f64>().ok());
            let lon = record.get(lon_idx).and_then(|v| v.trim().parse::<f64>().ok());
            match (name.is_empty(), lat, lon) {
                (false, Some(lat), Some(lon)) => reference.insert(name, lat, lon),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("{}: skipped {} coordinate row(s) without a name or numeric position", source, skipped);
        }
        Ok(reference)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        Self::from_reader(&path.display().to_string(), file)
    }
}

impl GeoReference for CoordinateReference {
    fn locate(&self, recipient: &str) -> Option<GeoLocation> {
        self.points.get(recipient).copied()
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

/// Named regions from a GeoJSON FeatureCollection.
#[derive(Debug, Clone, Default)]
pub struct BoundaryReference {
    regions: HashMap<String, GeoLocation>,
    name_property: String,
}

pub const DEFAULT_NAME_PROPERTY: &str = "ADMIN";

impl BoundaryReference {
    pub fn from_geojson(text: &str, name_property: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        let features = doc
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| LoadError::GeoJson("expected a FeatureCollection with a 'features' array".to_string()))?;

        let mut regions = HashMap::new();
        let mut skipped = 0usize;
        for feature in features {
            let name = feature
                .get("properties")
                .and_then(|p| p.get(name_property))
                .and_then(Value::as_str);
            let centre = feature.get("geometry").and_then(representative_point);
            match (name, centre) {
                (Some(name), Some(loc)) => {
                    regions.insert(name.to_string(), loc);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("skipped {} boundary feature(s) without '{}' or a polygon", skipped, name_property);
        }
        Ok(BoundaryReference {
            regions,
            name_property: name_property.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>, name_property: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_geojson(&text, name_property)
    }

    pub fn name_property(&self) -> &str {
        &self.name_property
    }
}

impl GeoReference for BoundaryReference {
    fn locate(&self, recipient: &str) -> Option<GeoLocation> {
        self.regions.get(recipient).copied()
    }

    fn region(&self, recipient: &str) -> Option<String> {
        self.regions.contains_key(recipient).then(|| recipient.to_string())
    }

    fn len(&self) -> usize {
        self.regions.len()
    }
}

/// Mean of the exterior-ring vertices of a Polygon or MultiPolygon.
fn representative_point(geometry: &Value) -> Option<GeoLocation> {
    let coords = geometry.get("coordinates")?;
    let rings: Vec<&Value> = match geometry.get("type")?.as_str()? {
        "Polygon" => vec![coords.get(0)?],
        "MultiPolygon" => coords
            .as_array()?
            .iter()
            .filter_map(|polygon| polygon.get(0))
            .collect(),
        "Point" => {
            let lon = coords.get(0)?.as_f64()?;
            let lat = coords.get(1)?.as_f64()?;
            return Some(GeoLocation { latitude: lat, longitude: lon });
        }
        _ => return None,
    };
    let (mut lat_sum, mut lon_sum, mut n) = (0.0, 0.0, 0usize);
    for ring in rings {
        for vertex in ring.as_array()? {
            // GeoJSON positions are [longitude, latitude].
            let lon = vertex.get(0).and_then(Value::as_f64);
            let lat = vertex.get(1).and_then(Value::as_f64);
            if let (Some(lon), Some(lat)) = (lon, lat) {
                lon_sum += lon;
                lat_sum += lat;
                n += 1;
            }
        }
    }
    if n == 0 {
        return None;
    }
    Some(GeoLocation {
        latitude: lat_sum / n as f64,
        longitude: lon_sum / n as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(rows: &[(&str, f64)]) -> Vec<RankedTotal> {
        rows.iter()
            .enumerate()
            .map(|(i, (name, value))| RankedTotal {
                rank: i + 1,
                name: name.to_string(),
                value: *value,
            })
            .collect()
    }

    #[test]
    fn misses_are_dropped_from_the_map_only() {
        let recipients = totals(&[("Fiji", 100.0), ("Atlantis", 50.0)]);
        let mut reference = CoordinateReference::new();
        reference.insert("Fiji", -17.7, 178.1);
        let joined = join(&recipients, &reference);
        assert_eq!(joined.points.len(), 1);
        assert_eq!(joined.points[0].recipient, "Fiji");
        assert_eq!(joined.points[0].value, 100.0);
        assert_eq!(joined.misses, vec!["Atlantis".to_string()]);
        assert_eq!(recipients.len(), 2);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut reference = CoordinateReference::new();
        reference.insert("Fiji", -17.7, 178.1);
        assert!(reference.locate("fiji").is_none());
        assert!(reference.locate("Fiji").is_some());
    }

    #[test]
    fn coordinates_from_csv() {
        let csv = "Country,Lat,Lng\nFiji,-17.7,178.1\nTonga,bad,1\n,1,1\nSamoa,-13.8,-172.1\n";
        let reference = CoordinateReference::from_reader("coords.csv", csv.as_bytes()).unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(
            reference.locate("Samoa"),
            Some(GeoLocation { latitude: -13.8, longitude: -172.1 })
        );
    }

    #[test]
    fn coordinates_need_their_columns() {
        let err = CoordinateReference::from_reader("coords.csv", "name,lat\nFiji,1\n".as_bytes());
        assert!(matches!(err, Err(LoadError::MissingColumns { ref columns, .. }) if columns == &vec!["longitude".to_string()]));
    }

    #[test]
    fn boundaries_match_by_name_property() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"ADMIN": "Fiji"},
                 "geometry": {"type": "Polygon", "coordinates": [[[178.0, -18.0], [179.0, -18.0], [179.0, -17.0], [178.0, -17.0]]]}},
                {"type": "Feature", "properties": {"ADMIN": "Tonga"},
                 "geometry": {"type": "MultiPolygon", "coordinates": [[[[-175.0, -21.0], [-174.0, -21.0]]], [[[-175.0, -19.0], [-174.0, -19.0]]]]}},
                {"type": "Feature", "properties": {"NAME": "Nowhere"}, "geometry": null}
            ]
        }"#;
        let reference = BoundaryReference::from_geojson(doc, DEFAULT_NAME_PROPERTY).unwrap();
        assert_eq!(reference.len(), 2);
        let fiji = reference.locate("Fiji").unwrap();
        assert!((fiji.latitude + 17.5).abs() < 1e-9);
        assert!((fiji.longitude - 178.5).abs() < 1e-9);
        let tonga = reference.locate("Tonga").unwrap();
        assert!((tonga.latitude + 20.0).abs() < 1e-9);

        let joined = join(&totals(&[("Fiji", 10.0), ("Atlantis", 5.0)]), &reference);
        assert_eq!(joined.points.len(), 1);
        assert_eq!(joined.points[0].region.as_deref(), Some("Fiji"));
    }

    #[test]
    fn boundary_document_must_be_a_collection() {
        assert!(matches!(
            BoundaryReference::from_geojson("{\"type\": \"Feature\"}", DEFAULT_NAME_PROPERTY),
            Err(LoadError::GeoJson(_))
        ));
    }
}
