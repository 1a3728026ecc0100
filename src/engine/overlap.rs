//! Levelwise enumeration of non-empty band intersections.
//!
//! Instead of testing every r-combination of bands, intersections are grown
//! one level at a time: surviving regions of arity r-1 are extended by a
//! single band with a higher canonical ordinal than every current
//! participant. A participant set is therefore built in exactly one order,
//! and a set with empty intersection is never extended, so work stays
//! proportional to the number of surviving overlaps.

use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Point};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

use super::index::{BandIndex, PoiIndex};
use crate::models::{Band, Poi};

/// Minimum area for an intersection to survive. Boundary-touching slivers
/// fall below this and are treated as empty, so they neither appear in the
/// output nor seed deeper levels.
const MIN_REGION_AREA: f64 = 1e-6;

/// Bounds on the enumeration: arity ceiling, hard region cap and an
/// optional wall-clock deadline checked at each level boundary.
#[derive(Debug, Clone)]
pub(crate) struct EnumerationLimits {
    pub max_arity: usize,
    pub max_regions: usize,
    pub deadline: Option<Instant>,
}

/// A surviving intersection of two or more bands.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    /// Band ordinals, ascending (canonical participant order)
    pub participants: Vec<usize>,
    pub geometry: MultiPolygon<f64>,
    pub area: f64,
    /// Ordinals of the POIs inside this region
    pub point_ordinals: Vec<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct EnumerationOutcome {
    /// Regions ordered by ascending arity, then participant set
    pub regions: Vec<Region>,
    pub truncated: bool,
    pub timed_out: bool,
}

pub(crate) fn enumerate(
    bands: &[Band],
    index: &BandIndex,
    poi_index: &PoiIndex,
    points: &[Poi],
    limits: &EnumerationLimits,
) -> EnumerationOutcome {
    let mut outcome = EnumerationOutcome::default();

    if limits.max_arity < 2 || index.len() < 2 {
        return outcome;
    }

    info!(
        "Enumerating intersections across {} bands (max arity {}, region cap {})",
        index.len(),
        limits.max_arity,
        limits.max_regions
    );

    if expired(limits.deadline) {
        outcome.timed_out = true;
        return outcome;
    }

    // Level 2: canonical pairs whose bounding boxes overlap.
    let pairs = seed_pairs(bands, index);
    let survivors = keep_sorted(
        pairs
            .par_iter()
            .map(|&(i, j)| intersect_pair(bands, i, j))
            .collect(),
    );
    debug!(
        "Level 2: {} candidate pairs -> {} surviving regions",
        pairs.len(),
        survivors.len()
    );

    let mut level_start = 0;
    push_with_cap(&mut outcome, survivors, limits.max_regions);

    // Levels 3..=max_arity: extend the previous frontier by one band each.
    for arity in 3..=limits.max_arity {
        if outcome.truncated {
            break;
        }
        if expired(limits.deadline) {
            outcome.timed_out = true;
            break;
        }

        let frontier = &outcome.regions[level_start..];
        if frontier.is_empty() {
            break;
        }

        let tasks = extension_tasks(frontier, index);
        let survivors = keep_sorted(
            tasks
                .par_iter()
                .map(|&(parent, band)| extend_region(&frontier[parent], bands, band))
                .collect(),
        );
        debug!(
            "Level {}: {} candidate extensions -> {} surviving regions",
            arity,
            tasks.len(),
            survivors.len()
        );

        level_start = outcome.regions.len();
        push_with_cap(&mut outcome, survivors, limits.max_regions);
    }

    populate_points(&mut outcome.regions, poi_index, points);

    let pairwise = outcome
        .regions
        .iter()
        .filter(|r| r.participants.len() == 2)
        .count();
    info!(
        "Found {} overlap regions ({} pairwise, {} multiway){}",
        outcome.regions.len(),
        pairwise,
        outcome.regions.len() - pairwise,
        if outcome.truncated { ", truncated" } else { "" }
    );

    outcome
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

/// Canonical (i, j) pairs with i < j and overlapping envelopes.
fn seed_pairs(bands: &[Band], index: &BandIndex) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in index.indexed_ordinals() {
        if let Some(rect) = bands[i].bbox() {
            for j in index.candidates_in_rect(&rect) {
                if j > i {
                    pairs.push((i, j));
                }
            }
        }
    }
    pairs
}

/// (frontier position, band ordinal) extension candidates. Only bands above
/// the region's highest participant are considered, so each participant set
/// is generated exactly once.
fn extension_tasks(frontier: &[Region], index: &BandIndex) -> Vec<(usize, usize)> {
    let mut tasks = Vec::new();
    for (position, region) in frontier.iter().enumerate() {
        let highest = match region.participants.last() {
            Some(&ordinal) => ordinal,
            None => continue,
        };
        let rect = match region.geometry.bounding_rect() {
            Some(rect) => rect,
            None => continue,
        };
        for band in index.candidates_in_rect(&rect) {
            if band > highest {
                tasks.push((position, band));
            }
        }
    }
    tasks
}

fn intersect_pair(bands: &[Band], i: usize, j: usize) -> Option<Region> {
    let geometry = bands[i].geometry.intersection(&bands[j].geometry);
    survive(vec![i, j], geometry)
}

fn extend_region(parent: &Region, bands: &[Band], band: usize) -> Option<Region> {
    let geometry = parent.geometry.intersection(&bands[band].geometry);
    let mut participants = parent.participants.clone();
    participants.push(band);
    survive(participants, geometry)
}

/// Keep a region only while its intersection has real area.
fn survive(participants: Vec<usize>, geometry: MultiPolygon<f64>) -> Option<Region> {
    if geometry.0.is_empty() {
        return None;
    }
    let area = geometry.unsigned_area();
    if area <= MIN_REGION_AREA {
        return None;
    }
    Some(Region {
        participants,
        geometry,
        area,
        point_ordinals: Vec::new(),
    })
}

/// Drop failed candidates and order survivors canonically so output and
/// cap cut-off are independent of scheduling.
fn keep_sorted(candidates: Vec<Option<Region>>) -> Vec<Region> {
    let mut survivors: Vec<Region> = candidates.into_iter().flatten().collect();
    survivors.sort_by(|a, b| a.participants.cmp(&b.participants));
    survivors
}

/// Append survivors until the cap is hit; a dropped survivor marks the
/// outcome truncated.
fn push_with_cap(outcome: &mut EnumerationOutcome, survivors: Vec<Region>, max_regions: usize) {
    for region in survivors {
        if outcome.regions.len() < max_regions {
            outcome.regions.push(region);
        } else {
            outcome.truncated = true;
            break;
        }
    }
}

/// Fill each region's POI list via the point index plus the same
/// boundary-inclusive predicate the classifier uses.
fn populate_points(regions: &mut [Region], poi_index: &PoiIndex, points: &[Poi]) {
    let sets: Vec<Vec<usize>> = regions
        .par_iter()
        .map(|region| {
            let rect = match region.geometry.bounding_rect() {
                Some(rect) => rect,
                None => return Vec::new(),
            };
            poi_index
                .candidates_in_rect(&rect)
                .into_iter()
                .filter(|&p| {
                    let location = Point::new(points[p].lon, points[p].lat);
                    region.geometry.intersects(&location)
                })
                .collect()
        })
        .collect();

    for (region, set) in regions.iter_mut().zip(sets) {
        region.point_ordinals = set;
    }
}
