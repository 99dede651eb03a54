use crate::types::Region;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Finds the feature containing a point.
///
/// Containment excludes the boundary: a point lying exactly on an edge is not
/// inside that polygon. When polygons overlap, the one earliest in the
/// features file wins.
pub struct PointLocator<'a> {
    regions: &'a [Region],
    tree: RTree<RegionEnvelope>,
}

impl<'a> PointLocator<'a> {
    pub fn new(regions: &'a [Region]) -> Self {
        let items: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .filter_map(|(i, region)| {
                // Empty geometries have no bounding box and can never match
                let rect = region.geometry.bounding_rect()?;
                Some(RegionEnvelope {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            regions,
            tree: RTree::bulk_load(items),
        }
    }

    /// Number of features, matched or not; every index `locate` returns is below this.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Index of the first region containing `point`, or `None` when unmatched.
    pub fn locate(&self, point: &Point<f64>) -> Option<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);

        // The tree yields candidates in no particular order, so keep the lowest match
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&i| self.regions[i].geometry.contains(point))
            .min()
    }
}
