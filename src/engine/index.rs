//! Spatial indexes for fast band and POI candidate lookups.

use geo::{Area, Rect, Validation};
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use crate::models::{Band, Poi};

/// Wrapper for R-tree indexing of a band by its ordinal in the run's band slice
#[derive(Clone)]
struct IndexedBand {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBand {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Bounding-box index over the run's band geometries.
///
/// Queries over-approximate: callers must still apply exact predicates to
/// the returned candidates. Invalid or degenerate geometries are excluded
/// at build time and never produce candidates.
pub struct BandIndex {
    tree: RTree<IndexedBand>,
    /// Ordinals excluded from the index, with the exclusion reason
    skipped: Vec<(usize, String)>,
}

impl BandIndex {
    /// Build the index once for a static band set.
    pub fn build(bands: &[Band]) -> Self {
        info!("Building spatial index for {} bands...", bands.len());

        let mut indexed = Vec::with_capacity(bands.len());
        let mut skipped = Vec::new();

        for (ordinal, band) in bands.iter().enumerate() {
            let rect = match band.bbox() {
                Some(rect) => rect,
                None => {
                    warn!("Band {} has empty geometry, excluding from index", band.id);
                    skipped.push((ordinal, "empty geometry".to_string()));
                    continue;
                }
            };

            if band.geometry.unsigned_area() <= 0.0 {
                warn!(
                    "Band {} has zero-area geometry, excluding from index",
                    band.id
                );
                skipped.push((ordinal, "zero-area geometry".to_string()));
                continue;
            }

            if !band.geometry.is_valid() {
                warn!("Band {} has invalid geometry, excluding from index", band.id);
                skipped.push((ordinal, "invalid geometry".to_string()));
                continue;
            }

            indexed.push(IndexedBand {
                ordinal,
                envelope: rect_to_aabb(&rect),
            });
        }

        let tree = RTree::bulk_load(indexed);
        info!(
            "Spatial index built with {} entries ({} skipped)",
            tree.size(),
            skipped.len()
        );

        Self { tree, skipped }
    }

    /// Ordinals of all bands whose bounding box contains the point, ascending.
    pub fn candidates_for_point(&self, x: f64, y: f64) -> Vec<usize> {
        let envelope = AABB::from_point([x, y]);
        let mut ordinals: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|ib| ib.ordinal)
            .collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// Ordinals of all bands whose bounding box intersects the rect, ascending.
    pub fn candidates_in_rect(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut ordinals: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&rect_to_aabb(rect))
            .map(|ib| ib.ordinal)
            .collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// Ordinals present in the index, ascending.
    pub fn indexed_ordinals(&self) -> Vec<usize> {
        let mut ordinals: Vec<usize> = self.tree.iter().map(|ib| ib.ordinal).collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// Bands excluded at build time, as (ordinal, reason) pairs.
    pub fn skipped(&self) -> &[(usize, String)] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Wrapper for R-tree indexing of a POI by its ordinal in the run's point slice
#[derive(Clone)]
struct IndexedPoi {
    ordinal: usize,
    position: [f64; 2],
}

impl RTreeObject for IndexedPoi {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Bounding-box index over the run's POI locations.
pub struct PoiIndex {
    tree: RTree<IndexedPoi>,
}

impl PoiIndex {
    pub fn build(points: &[Poi]) -> Self {
        let indexed = points
            .iter()
            .enumerate()
            .map(|(ordinal, poi)| IndexedPoi {
                ordinal,
                position: [poi.lon, poi.lat],
            })
            .collect();

        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Ordinals of all POIs inside the rect, ascending.
    pub fn candidates_in_rect(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut ordinals: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&rect_to_aabb(rect))
            .map(|ip| ip.ordinal)
            .collect();
        ordinals.sort_unstable();
        ordinals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandId;
    use geo::{polygon, MultiPolygon};

    fn square(x0: f64, y0: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]
    }

    #[test]
    fn test_build_skips_degenerate_geometry() {
        let bands = vec![
            Band::from_polygon(BandId::new("C1", 0), 0.0, 10.0, square(0.0, 0.0, 2.0)),
            Band::new(BandId::new("C2", 0), 0.0, 10.0, MultiPolygon::new(vec![])),
        ];

        let index = BandIndex::build(&bands);
        assert_eq!(index.len(), 1);
        assert_eq!(index.skipped().len(), 1);
        assert_eq!(index.skipped()[0].0, 1);
        assert_eq!(index.indexed_ordinals(), vec![0]);
    }

    #[test]
    fn test_point_candidates_are_bbox_hits() {
        let bands = vec![
            Band::from_polygon(BandId::new("C1", 0), 0.0, 10.0, square(0.0, 0.0, 2.0)),
            Band::from_polygon(BandId::new("C2", 0), 0.0, 10.0, square(5.0, 5.0, 2.0)),
        ];

        let index = BandIndex::build(&bands);
        assert_eq!(index.candidates_for_point(1.0, 1.0), vec![0]);
        assert_eq!(index.candidates_for_point(6.0, 6.0), vec![1]);
        assert!(index.candidates_for_point(3.5, 3.5).is_empty());
    }

    #[test]
    fn test_rect_query_on_empty_index() {
        let index = BandIndex::build(&[]);
        assert!(index.is_empty());

        let rect = Rect::new((0.0, 0.0), (10.0, 10.0));
        assert!(index.candidates_in_rect(&rect).is_empty());
    }

    #[test]
    fn test_poi_index_rect_query() {
        let points = vec![
            Poi::new("p1", 1.0, 1.0),
            Poi::new("p2", 6.0, 6.0),
            Poi::new("p3", 1.5, 1.5),
        ];

        let index = PoiIndex::build(&points);
        let rect = Rect::new((0.0, 0.0), (2.0, 2.0));
        assert_eq!(index.candidates_in_rect(&rect), vec![0, 2]);
    }
}
