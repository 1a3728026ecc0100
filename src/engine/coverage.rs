//! POI classification against the band set.

use geo::{Intersects, Point};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use tracing::{debug, info};

use super::index::BandIndex;
use crate::models::{Band, BandCoverage, Center, CenterCoverage, CoverageResult, Poi};

/// Classify every POI against the indexed bands.
///
/// Candidates come from the bounding-box index; exact containment is
/// boundary-inclusive, so a POI sitting on a band edge counts as covered.
/// A POI inside several bands of one center is counted once at the center
/// level via a visited set.
pub fn classify(
    points: &[Poi],
    bands: &[Band],
    index: &BandIndex,
    centers: &[Center],
) -> CoverageResult {
    info!(
        "Classifying {} points against {} indexed bands",
        points.len(),
        index.len()
    );

    // Exact containment per point, candidates pruned by the index.
    // Results are folded in input order below, so output is deterministic.
    let hits: Vec<Vec<usize>> = points
        .par_iter()
        .map(|poi| {
            let location = Point::new(poi.lon, poi.lat);
            index
                .candidates_for_point(poi.lon, poi.lat)
                .into_iter()
                .filter(|&ordinal| bands[ordinal].geometry.intersects(&location))
                .collect()
        })
        .collect();

    let mut per_band: Vec<Vec<usize>> = vec![Vec::new(); bands.len()];
    let mut uncovered_ids = Vec::new();
    let mut covered = 0usize;

    for (poi_ordinal, contained_in) in hits.iter().enumerate() {
        if contained_in.is_empty() {
            uncovered_ids.push(points[poi_ordinal].id.clone());
        } else {
            covered += 1;
            for &band_ordinal in contained_in {
                per_band[band_ordinal].push(poi_ordinal);
            }
        }
    }

    let total_points = points.len();
    let max_production: HashMap<&str, f64> = centers
        .iter()
        .filter_map(|c| c.max_production.map(|mp| (c.id.as_str(), mp)))
        .collect();

    let center_coverages = build_center_coverages(points, bands, &per_band, total_points, &max_production);

    let most_covered_center = center_coverages
        .iter()
        .filter(|c| c.unique_count > 0)
        .max_by_key(|c| c.unique_count)
        .map(|c| c.center.clone());

    debug!(
        "Classification done: {}/{} covered, {} out-of-band",
        covered,
        total_points,
        uncovered_ids.len()
    );

    CoverageResult {
        total_points,
        covered,
        uncovered: uncovered_ids.len(),
        uncovered_ids,
        coverage_pct: percentage(covered, total_points),
        centers: center_coverages,
        most_covered_center,
    }
}

/// Group per-band hits into per-center coverage. Bands arrive in canonical
/// order, so each center's bands are contiguous.
fn build_center_coverages(
    points: &[Poi],
    bands: &[Band],
    per_band: &[Vec<usize>],
    total_points: usize,
    max_production: &HashMap<&str, f64>,
) -> Vec<CenterCoverage> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (ordinal, band) in bands.iter().enumerate() {
        match groups.last_mut() {
            Some((center, ordinals)) if *center == band.id.center => ordinals.push(ordinal),
            _ => groups.push((band.id.center.clone(), vec![ordinal])),
        }
    }

    groups
        .into_iter()
        .map(|(center, ordinals)| {
            let band_coverages: Vec<BandCoverage> = ordinals
                .iter()
                .map(|&ordinal| {
                    build_band_coverage(
                        points,
                        &bands[ordinal],
                        &per_band[ordinal],
                        total_points,
                        max_production.get(center.as_str()).copied(),
                    )
                })
                .collect();

            let mut visited: HashSet<usize> = HashSet::new();
            for &ordinal in &ordinals {
                visited.extend(per_band[ordinal].iter().copied());
            }
            let mut unique: Vec<usize> = visited.into_iter().collect();
            unique.sort_unstable();

            let max_coverage_band = band_coverages
                .iter()
                .filter(|b| b.count > 0)
                .max_by_key(|b| b.count)
                .map(|b| b.label.clone());

            CenterCoverage {
                center,
                total_bands: band_coverages.len(),
                bands: band_coverages,
                unique_count: unique.len(),
                unique_point_ids: unique.into_iter().map(|p| points[p].id.clone()).collect(),
                max_coverage_band,
            }
        })
        .collect()
}

fn build_band_coverage(
    points: &[Poi],
    band: &Band,
    hits: &[usize],
    total_points: usize,
    max_production: Option<f64>,
) -> BandCoverage {
    let point_ids: Vec<String> = hits.iter().map(|&p| points[p].id.clone()).collect();

    let production_values: Vec<f64> = hits
        .iter()
        .filter_map(|&p| points[p].production())
        .collect();
    let production_sum = if production_values.is_empty() {
        None
    } else {
        Some(production_values.iter().sum())
    };
    let viable = max_production.map(|limit| production_sum.unwrap_or(0.0) <= limit);

    BandCoverage {
        id: band.id.clone(),
        label: band.label(),
        lower: band.lower,
        upper: band.upper,
        count: hits.len(),
        point_ids,
        coverage_pct: percentage(hits.len(), total_points),
        production_sum,
        viable,
        zonal: Vec::new(),
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandId;
    use geo::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]
    }

    /// Ring-shaped band: outer square minus inner square.
    fn ring(x0: f64, y0: f64, inner: f64, outer: f64) -> geo::Polygon<f64> {
        let outer_ring = geo::LineString::from(vec![
            (x0 - outer, y0 - outer),
            (x0 + outer, y0 - outer),
            (x0 + outer, y0 + outer),
            (x0 - outer, y0 + outer),
            (x0 - outer, y0 - outer),
        ]);
        let inner_ring = geo::LineString::from(vec![
            (x0 - inner, y0 - inner),
            (x0 + inner, y0 - inner),
            (x0 + inner, y0 + inner),
            (x0 - inner, y0 + inner),
            (x0 - inner, y0 - inner),
        ]);
        geo::Polygon::new(outer_ring, vec![inner_ring])
    }

    #[test]
    fn test_one_center_two_rings() {
        // Inner disc and its surrounding ring, plus one point outside both.
        let bands = vec![
            Band::from_polygon(BandId::new("C1", 0), 0.0, 10.0, square(-1.0, -1.0, 2.0)),
            Band::from_polygon(BandId::new("C1", 1), 10.0, 20.0, ring(0.0, 0.0, 1.0, 3.0)),
        ];
        let points = vec![
            Poi::new("inner", 0.0, 0.0),
            Poi::new("ring", 2.0, 2.0),
            Poi::new("outside", 9.0, 9.0),
        ];

        let index = BandIndex::build(&bands);
        let result = classify(&points, &bands, &index, &[]);

        assert_eq!(result.total_points, 3);
        assert_eq!(result.covered, 2);
        assert_eq!(result.uncovered, 1);
        assert_eq!(result.uncovered_ids, vec!["outside".to_string()]);
        assert_eq!(result.covered + result.uncovered, result.total_points);

        assert_eq!(result.centers.len(), 1);
        let center = &result.centers[0];
        assert_eq!(center.bands[0].count, 1);
        assert_eq!(center.bands[0].point_ids, vec!["inner".to_string()]);
        assert_eq!(center.bands[1].count, 1);
        assert_eq!(center.bands[1].point_ids, vec!["ring".to_string()]);
        assert_eq!(center.unique_count, 2);
    }

    #[test]
    fn test_band_ids_subset_of_center_ids() {
        // Malformed input: two bands of one center overlapping. The point is
        // counted in each band but once at the center level.
        let bands = vec![
            Band::from_polygon(BandId::new("C1", 0), 0.0, 10.0, square(0.0, 0.0, 4.0)),
            Band::from_polygon(BandId::new("C1", 1), 10.0, 20.0, square(1.0, 1.0, 4.0)),
        ];
        let points = vec![Poi::new("p1", 2.0, 2.0)];

        let index = BandIndex::build(&bands);
        let result = classify(&points, &bands, &index, &[]);

        let center = &result.centers[0];
        assert_eq!(center.bands[0].count, 1);
        assert_eq!(center.bands[1].count, 1);
        assert_eq!(center.unique_count, 1);
        for band in &center.bands {
            for id in &band.point_ids {
                assert!(center.unique_point_ids.contains(id));
            }
        }
    }

    #[test]
    fn test_boundary_point_counts_as_contained() {
        let bands = vec![Band::from_polygon(
            BandId::new("C1", 0),
            0.0,
            10.0,
            square(0.0, 0.0, 2.0),
        )];
        let points = vec![Poi::new("edge", 0.0, 1.0)];

        let index = BandIndex::build(&bands);
        let result = classify(&points, &bands, &index, &[]);

        assert_eq!(result.covered, 1);
    }

    #[test]
    fn test_production_viability() {
        let bands = vec![Band::from_polygon(
            BandId::new("C1", 0),
            0.0,
            10.0,
            square(0.0, 0.0, 4.0),
        )];
        let mut p1 = Poi::new("p1", 1.0, 1.0);
        p1.metadata.insert("production".into(), "30".into());
        let mut p2 = Poi::new("p2", 2.0, 2.0);
        p2.metadata.insert("production".into(), "25".into());

        let mut center = Center::new("C1", 0.0, 0.0);
        center.max_production = Some(50.0);

        let index = BandIndex::build(&bands);
        let result = classify(&[p1, p2], &bands, &index, &[center]);

        let band = &result.centers[0].bands[0];
        assert_eq!(band.production_sum, Some(55.0));
        assert_eq!(band.viable, Some(false));
    }

    #[test]
    fn test_empty_inputs() {
        let index = BandIndex::build(&[]);
        let result = classify(&[], &[], &index, &[]);
        assert_eq!(result.total_points, 0);
        assert_eq!(result.coverage_pct, 0.0);

        let points = vec![Poi::new("p1", 1.0, 1.0)];
        let result = classify(&points, &[], &index, &[]);
        assert_eq!(result.covered, 0);
        assert_eq!(result.uncovered, 1);
        assert!(result.most_covered_center.is_none());
    }
}
