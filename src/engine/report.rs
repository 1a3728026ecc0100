//! Assembly of the final analysis report.
//!
//! Pure assembly: classifier, enumerator and aggregator outputs are merged
//! without further computation, with a stable region ordering so identical
//! inputs produce identical output.

use chrono::Utc;
use hashbrown::HashMap;
use std::collections::BTreeMap;

use super::overlap::{EnumerationOutcome, Region};
use crate::models::{
    AnalysisReport, Band, BandId, CoverageResult, Poi, RegionReport, SkippedBand, ZonalStats,
};

/// Stable reference string for a region: participant keys joined.
pub(crate) fn region_ref(region: &Region, bands: &[Band]) -> String {
    region
        .participants
        .iter()
        .map(|&ordinal| bands[ordinal].id.key())
        .collect::<Vec<_>>()
        .join(" & ")
}

fn region_label(region: &Region, bands: &[Band]) -> String {
    region
        .participants
        .iter()
        .map(|&ordinal| bands[ordinal].label())
        .collect::<Vec<_>>()
        .join(" & ")
}

pub(crate) fn build_report(
    bands: &[Band],
    skipped_bands: Vec<SkippedBand>,
    mut coverage: CoverageResult,
    outcome: EnumerationOutcome,
    points: &[Poi],
    mut zonal: HashMap<String, Vec<ZonalStats>>,
    failed_rasters: BTreeMap<String, String>,
) -> AnalysisReport {
    // Attach per-band stats to the coverage entries they belong to.
    for center in &mut coverage.centers {
        for band in &mut center.bands {
            if let Some(stats) = zonal.remove(&band.id.key()) {
                band.zonal = stats;
            }
        }
    }

    let mut regions = outcome.regions;
    regions.sort_by(|a, b| {
        (a.participants.len(), &a.participants).cmp(&(b.participants.len(), &b.participants))
    });

    let region_reports: Vec<RegionReport> = regions
        .iter()
        .map(|region| {
            let geometry_ref = region_ref(region, bands);
            let participants: Vec<BandId> = region
                .participants
                .iter()
                .map(|&ordinal| bands[ordinal].id.clone())
                .collect();

            RegionReport {
                label: region_label(region, bands),
                arity: participants.len(),
                participants,
                count: region.point_ordinals.len(),
                point_ids: region
                    .point_ordinals
                    .iter()
                    .map(|&p| points[p].id.clone())
                    .collect(),
                area: region.area,
                zonal: zonal.remove(&geometry_ref).unwrap_or_default(),
                geometry_ref,
            }
        })
        .collect();

    let pairwise_regions = region_reports.iter().filter(|r| r.arity == 2).count();
    let max_overlap = region_reports.iter().map(|r| r.arity).max().unwrap_or(0);
    let total_intersection_area = region_reports.iter().map(|r| r.area).sum();

    AnalysisReport {
        generated_at: Utc::now(),
        total_points: points.len(),
        total_centers: coverage.centers.len(),
        total_bands: bands.len(),
        skipped_bands,
        coverage,
        total_regions: region_reports.len(),
        pairwise_regions,
        multiway_regions: region_reports.len() - pairwise_regions,
        max_overlap,
        total_intersection_area,
        regions: region_reports,
        failed_rasters,
        truncated: outcome.truncated,
        timed_out: outcome.timed_out,
    }
}
