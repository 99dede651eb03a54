//! Pulling a coordinate out of a loosely structured tweet record.

use crate::config::LocationFormat;
use geo::Point;
use serde_json::Value;

const LATITUDE_KEYS: [&str; 2] = ["lat", "latitude"];
const LONGITUDE_KEYS: [&str; 3] = ["lon", "lng", "longitude"];

/// Follow `key_path` through nested objects. A segment that parses as an
/// integer indexes into an array. `null` counts as missing.
pub fn lookup<'a, S: AsRef<str>>(record: &'a Value, key_path: &[S]) -> Option<&'a Value> {
    let mut current = record;
    for key in key_path {
        let key = key.as_ref();
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Extracts a tweet's location as a `Point` with x = longitude, y = latitude.
#[derive(Debug, Clone)]
pub struct LocationExtractor {
    key_path: Vec<String>,
    format: LocationFormat,
}

impl LocationExtractor {
    pub fn new(key_path: Vec<String>, format: LocationFormat) -> Self {
        Self { key_path, format }
    }

    pub fn extract(&self, record: &Value) -> Option<Point<f64>> {
        let location = lookup(record, self.key_path.as_slice())?;
        let (lon, lat) = match self.format {
            LocationFormat::LonLatArray => number_pair(location)?,
            LocationFormat::LatLonArray => {
                let (lat, lon) = number_pair(location)?;
                (lon, lat)
            }
            LocationFormat::LatLonDict => {
                let lat = first_number(location, &LATITUDE_KEYS)?;
                let lon = first_number(location, &LONGITUDE_KEYS)?;
                (lon, lat)
            }
        };
        Some(Point::new(lon, lat))
    }
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn number_pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_array()?.as_slice() {
        [a, b] => Some((finite(a)?, finite(b)?)),
        _ => None,
    }
}

fn first_number(value: &Value, keys: &[&str]) -> Option<f64> {
    let map = value.as_object()?;
    keys.iter().find_map(|k| map.get(*k)).and_then(finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor(path: &[&str], format: LocationFormat) -> LocationExtractor {
        LocationExtractor::new(path.iter().map(|s| s.to_string()).collect(), format)
    }

    #[test]
    fn twitter_api_layout() {
        let tweet = json!({
            "id": 1,
            "coordinates": {"type": "Point", "coordinates": [-122.4194, 37.7749]}
        });
        let p = extractor(&["coordinates", "coordinates"], LocationFormat::LonLatArray)
            .extract(&tweet)
            .unwrap();
        assert_eq!((p.x(), p.y()), (-122.4194, 37.7749));
    }

    #[test]
    fn array_orders_normalize_to_the_same_point() {
        let samples = [(-74.006, 40.7128), (0.0, 0.0), (151.2093, -33.8688), (-180.0, 90.0)];
        for (lon, lat) in samples {
            let twitter = json!({"coordinates": {"coordinates": [lon, lat]}});
            let gnip = json!({"geo": {"coordinates": [lat, lon]}});
            let a = extractor(&["coordinates", "coordinates"], LocationFormat::LonLatArray)
                .extract(&twitter)
                .unwrap();
            let b = extractor(&["geo", "coordinates"], LocationFormat::LatLonArray)
                .extract(&gnip)
                .unwrap();
            assert_eq!(a, b);
            assert_eq!((a.x(), a.y()), (lon, lat));
        }
    }

    #[test]
    fn dict_layout_accepts_common_key_names() {
        let e = extractor(&["location"], LocationFormat::LatLonDict);
        let short = e.extract(&json!({"location": {"lat": 10.5, "lon": 20}})).unwrap();
        let long = e
            .extract(&json!({"location": {"latitude": 10.5, "longitude": 20}}))
            .unwrap();
        let lng = e.extract(&json!({"location": {"lat": 10.5, "lng": 20}})).unwrap();
        assert_eq!(short, Point::new(20.0, 10.5));
        assert_eq!(short, long);
        assert_eq!(short, lng);
    }

    #[test]
    fn missing_or_null_paths_yield_none() {
        let e = extractor(&["coordinates", "coordinates"], LocationFormat::LonLatArray);
        assert!(e.extract(&json!({"text": "no geo"})).is_none());
        assert!(e.extract(&json!({"coordinates": null})).is_none());
        assert!(e.extract(&json!({"coordinates": "somewhere"})).is_none());
    }

    #[test]
    fn malformed_containers_yield_none() {
        let e = extractor(&["c"], LocationFormat::LonLatArray);
        assert!(e.extract(&json!({"c": [1.0]})).is_none());
        assert!(e.extract(&json!({"c": [1.0, 2.0, 3.0]})).is_none());
        assert!(e.extract(&json!({"c": ["1.0", 2.0]})).is_none());
        assert!(e.extract(&json!({"c": {"lat": 1.0, "lon": 2.0}})).is_none());

        let d = extractor(&["c"], LocationFormat::LatLonDict);
        assert!(d.extract(&json!({"c": {"lat": 1.0}})).is_none());
        assert!(d.extract(&json!({"c": [1.0, 2.0]})).is_none());
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let tweet = json!({"places": [{"point": [5.0, 6.0]}, {"point": [7.0, 8.0]}]});
        let p = extractor(&["places", "1", "point"], LocationFormat::LonLatArray)
            .extract(&tweet)
            .unwrap();
        assert_eq!(p, Point::new(7.0, 8.0));
        assert!(lookup(&tweet, &["places", "9"]).is_none());
        assert!(lookup(&tweet, &["places", "first"]).is_none());
    }
}
