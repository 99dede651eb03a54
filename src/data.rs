use crate::types::Region;
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::{Feature, GeoJson, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub fn load_features(path: &Path, name_property: &str) -> Result<Vec<Region>> {
    info!("Loading features from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open features file: {:?}", path))?;
    let regions = parse_features(BufReader::new(file), name_property)
        .with_context(|| format!("Invalid features file: {:?}", path))?;

    let empty = regions.iter().filter(|r| r.is_empty()).count();
    info!("Loaded {} features ({} without polygon geometry)", regions.len(), empty);
    Ok(regions)
}

/// Parse a GeoJSON FeatureCollection, keeping every feature at its input position.
pub fn parse_features<R: Read>(reader: R, name_property: &str) -> Result<Vec<Region>> {
    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| region_from_feature(index, feature, name_property))
        .collect()
}

fn region_from_feature(index: usize, feature: Feature, name_property: &str) -> Result<Region> {
    let properties = feature.properties.unwrap_or_default();

    // 1. Get a display name
    let name = [name_property, "id"]
        .iter()
        .find_map(|key| match properties.get(*key) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .or_else(|| match &feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s.clone()),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => None,
        })
        .unwrap_or_else(|| format!("#{}", index));

    // 2. Get Geometry
    // geojson crate Value -> geo types -> MultiPolygon
    let geometry = match feature.geometry.map(|g| g.value) {
        Some(value @ (Value::Polygon(_) | Value::MultiPolygon(_))) => {
            let geo_geom: geo::Geometry<f64> = value
                .try_into()
                .map_err(|e| anyhow!("Failed to convert geometry of feature {}: {:?}", index, e))?;
            match geo_geom {
                geo::Geometry::MultiPolygon(mp) => mp,
                geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                _ => MultiPolygon::new(vec![]),
            }
        }
        Some(other) => {
            warn!("Feature {} ({}) has {} geometry, it will never match", index, name, geometry_kind(&other));
            MultiPolygon::new(vec![])
        }
        None => {
            warn!("Feature {} ({}) has no geometry, it will never match", index, name);
            MultiPolygon::new(vec![])
        }
    };

    Ok(Region {
        index,
        name,
        properties,
        geometry,
    })
}

fn geometry_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// One line from a data file, parsed or not.
#[derive(Debug)]
pub enum TweetLine {
    Record(serde_json::Value),
    Malformed,
}

/// Streams newline-delimited JSON records from a list of files in order.
/// A path of `-` reads standard input.
pub struct TweetReader {
    files: std::vec::IntoIter<PathBuf>,
    stdin: Option<Box<dyn BufRead>>,
    current: Option<(PathBuf, Box<dyn BufRead>)>,
    line_number: usize,
    buf: Vec<u8>,
}

impl TweetReader {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files: files.into_iter(),
            stdin: None,
            current: None,
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Read `-` from `reader` instead of the process's standard input.
    pub fn with_stdin(mut self, reader: Box<dyn BufRead>) -> Self {
        self.stdin = Some(reader);
        self
    }

    fn open(&mut self, path: &Path) -> Result<Box<dyn BufRead>> {
        if path == Path::new("-") {
            return Ok(self
                .stdin
                .take()
                .unwrap_or_else(|| Box::new(BufReader::new(io::stdin()))));
        }
        let file = File::open(path)
            .with_context(|| format!("Failed to open data file: {:?}", path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

impl Iterator for TweetReader {
    type Item = Result<TweetLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.files.next()?;
                info!("Reading tweets from {:?}", path);
                match self.open(&path) {
                    Ok(reader) => self.current = Some((path, reader)),
                    Err(e) => return Some(Err(e)),
                }
                self.line_number = 0;
            }
            let Some((path, reader)) = self.current.as_mut() else {
                continue;
            };

            // Raw bytes: a line that is not UTF-8 is malformed, not an I/O failure
            self.buf.clear();
            let n_read = match reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    let err = anyhow!(e).context(format!(
                        "Failed to read line {} of {:?}",
                        self.line_number + 1,
                        path
                    ));
                    self.current = None;
                    return Some(Err(err));
                }
            };
            if n_read == 0 {
                // EOF
                self.current = None;
                continue;
            }
            self.line_number += 1;

            if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return Some(Ok(match serde_json::from_slice(&self.buf) {
                Ok(record) => TweetLine::Record(record),
                Err(e) => {
                    debug!("Skipping malformed line {} of {:?}: {}", self.line_number, path, e);
                    TweetLine::Malformed
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SQUARES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "A", "id": "a"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"id": 7},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[2,0],[3,0],[3,1],[2,1],[2,0]]]]}},
            {"type": "Feature", "properties": null,
             "geometry": {"type": "Point", "coordinates": [5, 5]}},
            {"type": "Feature", "properties": {}, "geometry": null}
        ]
    }"#;

    #[test]
    fn features_keep_input_order_and_names() {
        let regions = parse_features(SQUARES.as_bytes(), "name").unwrap();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(regions[0].name, "A");
        assert_eq!(regions[1].name, "7");
        assert_eq!(regions[2].name, "#2");
        assert_eq!(regions[0].geometry.0.len(), 1);
        assert_eq!(regions[1].geometry.0.len(), 1);
        assert!(regions[2].is_empty());
        assert!(regions[3].is_empty());
    }

    #[test]
    fn name_property_is_configurable() {
        let regions = parse_features(SQUARES.as_bytes(), "id").unwrap();
        assert_eq!(regions[0].name, "a");
    }

    #[test]
    fn non_collection_is_rejected() {
        let single = r#"{"type": "Feature", "properties": {},
            "geometry": {"type": "Point", "coordinates": [0, 0]}}"#;
        assert!(parse_features(single.as_bytes(), "name").is_err());
        assert!(parse_features("not json".as_bytes(), "name").is_err());
    }

    #[test]
    fn reader_streams_files_in_order_and_flags_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.jsonl");
        let second = dir.path().join("second.jsonl");
        let mut f = File::create(&first).unwrap();
        writeln!(f, "{{\"n\": 1}}").unwrap();
        writeln!(f, "{{broken").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{{\"n\": 2}}").unwrap();
        File::create(&second).unwrap().write_all(b"{\"n\": 3}").unwrap();

        let lines: Vec<TweetLine> = TweetReader::new(vec![first, second])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines.len(), 4);
        let numbers: Vec<i64> = lines
            .iter()
            .filter_map(|l| match l {
                TweetLine::Record(v) => v["n"].as_i64(),
                TweetLine::Malformed => None,
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(matches!(lines[1], TweetLine::Malformed));
    }

    #[test]
    fn invalid_utf8_line_is_malformed_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.jsonl");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"{\"n\": 1}\n{\"text\": \"caf\xe9\"}\n{\"n\": 2}\n").unwrap();

        let lines: Vec<TweetLine> = TweetReader::new(vec![path]).collect::<Result<_>>().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(matches!(lines[0], TweetLine::Record(_)));
        assert!(matches!(lines[1], TweetLine::Malformed));
        assert!(matches!(lines[2], TweetLine::Record(_)));
    }

    #[test]
    fn dash_reads_stdin_between_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.jsonl");
        File::create(&file).unwrap().write_all(b"{\"n\": 2}\n").unwrap();
        let stdin: Box<dyn BufRead> = Box::new(io::Cursor::new(b"{\"n\": 1}\n".to_vec()));

        let numbers: Vec<i64> = TweetReader::new(vec![PathBuf::from("-"), file])
            .with_stdin(stdin)
            .map(|l| match l.unwrap() {
                TweetLine::Record(v) => v["n"].as_i64().unwrap(),
                TweetLine::Malformed => panic!("unexpected malformed line"),
            })
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn missing_data_file_is_an_error() {
        let mut reader = TweetReader::new(vec![PathBuf::from("/definitely/not/here.jsonl")]);
        assert!(reader.next().unwrap().is_err());
    }
}
