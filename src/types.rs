use geo::MultiPolygon;
use serde_json::{Map, Value};

/// One polygonal feature from the features file.
#[derive(Debug, Clone)]
pub struct Region {
    /// Position in the FeatureCollection; this is the feature's identity.
    pub index: usize,
    pub name: String,
    pub properties: Map<String, Value>,
    // Empty when the feature had no polygonal geometry
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.geometry.0.is_empty()
    }
}
