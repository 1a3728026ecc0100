//! Result structures assembled for the transport layer.
//!
//! Everything here is plain serializable data; geometry never leaves the
//! engine, only identities, counts, ids and aggregates do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::BandId;

/// Coverage of one band: the POIs whose location falls inside its geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandCoverage {
    pub id: BandId,
    /// Human-readable band label (e.g. "C1_10")
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub point_ids: Vec<String>,
    /// Share of all analyzed POIs inside this band, in percent
    pub coverage_pct: f64,
    /// Sum of the "production" attribute over covered POIs, if any carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_sum: Option<f64>,
    /// Whether the production sum stays within the center's capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viable: Option<bool>,
    /// Zonal statistics for this band, one entry per configured raster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zonal: Vec<ZonalStats>,
}

/// Coverage of one center across all of its bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CenterCoverage {
    pub center: String,
    pub total_bands: usize,
    pub bands: Vec<BandCoverage>,
    /// Distinct POIs covered by any band of this center
    pub unique_count: usize,
    pub unique_point_ids: Vec<String>,
    /// Label of the band covering the most POIs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_coverage_band: Option<String>,
}

/// Classifier output: per-center coverage plus global totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageResult {
    pub total_points: usize,
    pub covered: usize,
    pub uncovered: usize,
    pub uncovered_ids: Vec<String>,
    pub coverage_pct: f64,
    pub centers: Vec<CenterCoverage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_covered_center: Option<String>,
}

/// A non-empty overlap of two or more bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionReport {
    /// Stable reference string for this region ("C1#0 & C2#0")
    pub geometry_ref: String,
    /// Human-readable label ("C1_10 & C2_10")
    pub label: String,
    /// Participating bands in canonical order
    pub participants: Vec<BandId>,
    pub arity: usize,
    pub count: usize,
    pub point_ids: Vec<String>,
    /// Region area in squared CRS units
    pub area: f64,
    /// Zonal statistics for this region, one entry per configured raster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zonal: Vec<ZonalStats>,
}

/// Aggregate raster values over one geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonalStats {
    /// Reference to the geometry the stats were computed for
    pub geometry_ref: String,
    /// Name of the raster source
    pub raster: String,
    /// False when the raster source failed to open for this run
    pub available: bool,
    pub count: u64,
    pub sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Geometry area in squared CRS units
    pub area: f64,
}

impl ZonalStats {
    /// Marker stats for a geometry whose raster source is unavailable.
    pub fn unavailable(geometry_ref: impl Into<String>, raster: impl Into<String>, area: f64) -> Self {
        Self {
            geometry_ref: geometry_ref.into(),
            raster: raster.into(),
            available: false,
            count: 0,
            sum: 0.0,
            mean: None,
            min: None,
            max: None,
            area,
        }
    }
}

/// A band excluded from the run, with the reason it was excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedBand {
    pub id: BandId,
    pub reason: String,
}

/// Complete analysis output for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub total_points: usize,
    pub total_centers: usize,
    pub total_bands: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_bands: Vec<SkippedBand>,
    pub coverage: CoverageResult,
    /// Discovered regions ordered by ascending arity, then participants
    pub regions: Vec<RegionReport>,
    pub total_regions: usize,
    pub pairwise_regions: usize,
    pub multiway_regions: usize,
    /// Highest arity among discovered regions (0 when none)
    pub max_overlap: usize,
    pub total_intersection_area: f64,
    /// Raster sources that failed to open, with the open error
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_rasters: BTreeMap<String, String>,
    /// True when the region list was cut short by the region cap
    pub truncated: bool,
    /// True when enumeration stopped early on the time budget
    pub timed_out: bool,
}
