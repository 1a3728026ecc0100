//! Analysis engine: configuration, orchestration and the public entry point.

pub mod coverage;
pub mod index;
mod overlap;
mod report;

pub use coverage::classify;
pub use index::{BandIndex, PoiIndex};

use anyhow::{Context, Result};
use geo::MultiPolygon;
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::models::{AnalysisReport, Band, Center, Poi, SkippedBand, ZonalStats};
use crate::raster::{stats_for_geometry, RasterDescriptor, RasterPool};
use overlap::{enumerate, EnumerationLimits, EnumerationOutcome};
use report::{build_report, region_ref};

/// Configuration surface consumed by the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Highest intersection arity to enumerate
    pub max_arity: usize,
    /// Hard cap on discovered regions; hitting it marks the report truncated
    pub max_regions: usize,
    /// Optional wall-clock budget for enumeration, checked per level
    pub time_budget_ms: Option<u64>,
    /// Raster sources to aggregate over bands and regions
    pub rasters: Vec<RasterDescriptor>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_arity: 3,
            max_regions: 256,
            time_budget_ms: None,
            rasters: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: AnalysisConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

/// Immutable input for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub centers: Vec<Center>,
    pub bands: Vec<Band>,
    pub points: Vec<Poi>,
}

/// Run the full analysis: classification, intersection enumeration and
/// optional zonal aggregation, assembled into one report.
///
/// A pure function of its inputs: identical input and configuration yield
/// an identical report (up to the generation timestamp). Bad input
/// degrades to a partial report with explicit markers, never a failure.
pub fn analyze(input: &AnalysisInput, config: &AnalysisConfig) -> AnalysisReport {
    let started = Instant::now();
    info!(
        "Starting analysis: {} centers, {} bands, {} points, {} raster sources",
        input.centers.len(),
        input.bands.len(),
        input.points.len(),
        config.rasters.len()
    );

    let (bands, mut skipped) = ingest_bands(&input.bands);
    let band_index = BandIndex::build(&bands);
    for (ordinal, reason) in band_index.skipped() {
        skipped.push(SkippedBand {
            id: bands[*ordinal].id.clone(),
            reason: reason.clone(),
        });
    }
    let poi_index = PoiIndex::build(&input.points);

    let coverage = classify(&input.points, &bands, &band_index, &input.centers);

    let limits = EnumerationLimits {
        max_arity: config.max_arity,
        max_regions: config.max_regions,
        deadline: config
            .time_budget_ms
            .map(|ms| started + Duration::from_millis(ms)),
    };
    let outcome = enumerate(&bands, &band_index, &poi_index, &input.points, &limits);

    let (zonal, failed_rasters) = collect_zonal(config, &bands, &band_index, &outcome);

    let analysis_report = build_report(
        &bands,
        skipped,
        coverage,
        outcome,
        &input.points,
        zonal,
        failed_rasters,
    );

    info!("Analysis finished in {:?}", started.elapsed());
    analysis_report
}

/// Sort bands canonically and drop duplicate identities, keeping the first.
fn ingest_bands(bands: &[Band]) -> (Vec<Band>, Vec<SkippedBand>) {
    let mut sorted = bands.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut kept: Vec<Band> = Vec::with_capacity(sorted.len());
    let mut skipped = Vec::new();

    for band in sorted {
        if kept.last().map(|k| k.id == band.id).unwrap_or(false) {
            warn!("Duplicate band identity {}, keeping the first", band.id);
            skipped.push(SkippedBand {
                id: band.id,
                reason: "duplicate band identity".to_string(),
            });
        } else {
            kept.push(band);
        }
    }

    (kept, skipped)
}

/// Zonal stats for every indexed band and discovered region, keyed by
/// geometry reference. One shared handle per raster source for the run.
fn collect_zonal(
    config: &AnalysisConfig,
    bands: &[Band],
    index: &BandIndex,
    outcome: &EnumerationOutcome,
) -> (HashMap<String, Vec<ZonalStats>>, BTreeMap<String, String>) {
    if config.rasters.is_empty() {
        return (HashMap::new(), BTreeMap::new());
    }

    let pool = RasterPool::new(&config.rasters);

    let items: Vec<(String, &MultiPolygon<f64>)> = index
        .indexed_ordinals()
        .into_iter()
        .map(|ordinal| (bands[ordinal].id.key(), &bands[ordinal].geometry))
        .chain(
            outcome
                .regions
                .iter()
                .map(|region| (region_ref(region, bands), &region.geometry)),
        )
        .collect();

    let computed: Vec<Vec<ZonalStats>> = items
        .par_iter()
        .map(|(geometry_ref, geometry)| stats_for_geometry(&pool, geometry, geometry_ref))
        .collect();

    let stats = items
        .into_iter()
        .map(|(geometry_ref, _)| geometry_ref)
        .zip(computed)
        .collect();

    (stats, pool.failures())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandId;
    use geo::polygon;
    use std::io::Write;

    fn square(x0: f64, y0: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]
    }

    fn band(center: &str, index: u32, upper: f64, polygon: geo::Polygon<f64>) -> Band {
        Band::from_polygon(BandId::new(center, index), 0.0, upper, polygon)
    }

    #[test]
    fn test_two_center_analysis() {
        let input = AnalysisInput {
            centers: vec![Center::new("C1", 0.0, 0.0), Center::new("C2", 0.0, 4.0)],
            bands: vec![
                band("C1", 0, 10.0, square(0.0, 0.0, 4.0)),
                band("C2", 0, 10.0, square(2.0, 0.0, 4.0)),
            ],
            points: vec![
                Poi::new("shared_1", 1.0, 3.0),
                Poi::new("shared_2", 2.0, 3.5),
                Poi::new("left", 1.0, 1.0),
                Poi::new("right", 1.0, 5.0),
                Poi::new("outside", 9.0, 9.0),
            ],
        };

        let report = analyze(&input, &AnalysisConfig::default());

        assert_eq!(report.total_points, 5);
        assert_eq!(report.total_centers, 2);
        assert_eq!(report.coverage.covered, 4);
        assert_eq!(report.coverage.uncovered, 1);
        assert_eq!(
            report.coverage.covered + report.coverage.uncovered,
            report.total_points
        );

        // Each center counts every point inside its own band, shared ones included.
        assert_eq!(report.coverage.centers[0].unique_count, 3);
        assert_eq!(report.coverage.centers[1].unique_count, 3);

        assert_eq!(report.total_regions, 1);
        assert_eq!(report.pairwise_regions, 1);
        assert_eq!(report.max_overlap, 2);
        let region = &report.regions[0];
        assert_eq!(region.geometry_ref, "C1#0 & C2#0");
        assert_eq!(
            region.point_ids,
            vec!["shared_1".to_string(), "shared_2".to_string()]
        );
        assert!(!report.truncated);
        assert!(!report.timed_out);
    }

    #[test]
    fn test_single_center_rings_yield_no_regions() {
        // Disc plus the ring around it: concentric, non-overlapping.
        let outer_ring = geo::Polygon::new(
            geo::LineString::from(vec![
                (-3.0, -3.0),
                (3.0, -3.0),
                (3.0, 3.0),
                (-3.0, 3.0),
                (-3.0, -3.0),
            ]),
            vec![geo::LineString::from(vec![
                (-1.0, -1.0),
                (1.0, -1.0),
                (1.0, 1.0),
                (-1.0, 1.0),
                (-1.0, -1.0),
            ])],
        );
        let input = AnalysisInput {
            centers: vec![Center::new("C1", 0.0, 0.0)],
            bands: vec![
                band("C1", 0, 10.0, square(-1.0, -1.0, 2.0)),
                Band::from_polygon(BandId::new("C1", 1), 10.0, 20.0, outer_ring),
            ],
            points: vec![
                Poi::new("inner", 0.0, 0.0),
                Poi::new("ring", 2.0, 2.0),
                Poi::new("outside", 9.0, 9.0),
            ],
        };

        let report = analyze(&input, &AnalysisConfig::default());

        assert_eq!(report.total_centers, 1);
        assert_eq!(report.coverage.centers[0].bands[0].count, 1);
        assert_eq!(report.coverage.centers[0].bands[1].count, 1);
        assert_eq!(report.coverage.uncovered, 1);
        // The rings touch along the shared boundary only, so no region survives.
        assert!(report.regions.is_empty());
    }

    #[test]
    fn test_empty_input_is_valid() {
        let report = analyze(&AnalysisInput::default(), &AnalysisConfig::default());

        assert_eq!(report.total_points, 0);
        assert_eq!(report.coverage.covered, 0);
        assert_eq!(report.coverage.coverage_pct, 0.0);
        assert!(report.regions.is_empty());
        assert!(!report.truncated);
    }

    #[test]
    fn test_failed_raster_leaves_analysis_intact() {
        let input = AnalysisInput {
            centers: Vec::new(),
            bands: vec![
                band("C1", 0, 10.0, square(0.0, 0.0, 4.0)),
                band("C2", 0, 10.0, square(2.0, 0.0, 4.0)),
            ],
            points: vec![Poi::new("p1", 1.0, 3.0)],
        };
        let config = AnalysisConfig {
            rasters: vec![RasterDescriptor {
                name: "population".to_string(),
                path: "/nonexistent/population.tif".into(),
                nodata: None,
            }],
            ..Default::default()
        };

        let report = analyze(&input, &config);

        assert_eq!(report.failed_rasters.len(), 1);
        assert!(report.failed_rasters.contains_key("population"));

        // Coverage and regions are complete despite the failed source.
        assert_eq!(report.coverage.covered, 1);
        assert_eq!(report.total_regions, 1);

        let band_stats = &report.coverage.centers[0].bands[0].zonal;
        assert_eq!(band_stats.len(), 1);
        assert!(!band_stats[0].available);
        let region_stats = &report.regions[0].zonal;
        assert_eq!(region_stats.len(), 1);
        assert!(!region_stats[0].available);
    }

    #[test]
    fn test_duplicate_band_identity_skipped() {
        let input = AnalysisInput {
            centers: Vec::new(),
            bands: vec![
                band("C1", 0, 10.0, square(0.0, 0.0, 4.0)),
                band("C1", 0, 10.0, square(2.0, 0.0, 4.0)),
            ],
            points: Vec::new(),
        };

        let report = analyze(&input, &AnalysisConfig::default());
        assert_eq!(report.total_bands, 1);
        assert_eq!(report.skipped_bands.len(), 1);
        assert_eq!(report.skipped_bands[0].reason, "duplicate band identity");
    }

    #[test]
    fn test_report_ordering_is_stable() {
        let input = AnalysisInput {
            centers: Vec::new(),
            bands: vec![
                band("C2", 0, 10.0, square(1.0, 1.0, 4.0)),
                band("C1", 0, 10.0, square(0.0, 0.0, 4.0)),
                band("C3", 0, 10.0, square(2.0, 2.0, 4.0)),
            ],
            points: Vec::new(),
        };

        let first = analyze(&input, &AnalysisConfig::default());
        let second = analyze(&input, &AnalysisConfig::default());

        let refs = |r: &AnalysisReport| -> Vec<String> {
            r.regions.iter().map(|x| x.geometry_ref.clone()).collect()
        };
        assert_eq!(refs(&first), refs(&second));

        // Ascending arity, then canonical participants.
        assert_eq!(
            refs(&first),
            vec![
                "C1#0 & C2#0".to_string(),
                "C1#0 & C3#0".to_string(),
                "C2#0 & C3#0".to_string(),
                "C1#0 & C2#0 & C3#0".to_string(),
            ]
        );
    }

    #[test]
    fn test_config_defaults_and_toml() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_arity, 3);
        assert_eq!(config.max_regions, 256);
        assert!(config.rasters.is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
max_arity = 4
max_regions = 50

[[rasters]]
name = "population"
path = "/data/population.tif"
nodata = -9999.0
"#
        )
        .unwrap();

        let config = AnalysisConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_arity, 4);
        assert_eq!(config.max_regions, 50);
        assert_eq!(config.rasters.len(), 1);
        assert_eq!(config.rasters[0].nodata, Some(-9999.0));
    }
}
