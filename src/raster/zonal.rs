//! Zonal statistics and the per-run raster handle pool.

use geo::{Area, BoundingRect, Intersects, MultiPolygon, Point};
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::source::{GridRaster, RasterDescriptor};
use crate::models::ZonalStats;

/// Aggregate the raster cells whose center lies inside the geometry.
///
/// Nodata and NaN cells are skipped. A geometry overlapping no cells
/// yields count 0 with empty aggregates, not an error.
pub fn zonal_stats(raster: &GridRaster, geometry: &MultiPolygon<f64>, geometry_ref: &str) -> ZonalStats {
    let area = geometry.unsigned_area();

    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    if let Some(rect) = geometry.bounding_rect() {
        let rows = raster.rows_overlapping(rect.min().y, rect.max().y);
        let cols = raster.cols_overlapping(rect.min().x, rect.max().x);

        for row in rows {
            for col in cols.clone() {
                let value = raster.value(row, col);
                if raster.is_nodata(value) {
                    continue;
                }
                let (x, y) = raster.cell_center(row, col);
                if !geometry.intersects(&Point::new(x, y)) {
                    continue;
                }
                count += 1;
                sum += value;
                min = min.min(value);
                max = max.max(value);
            }
        }
    }

    debug!(
        "Zonal stats for '{}' on raster '{}': {} cells",
        geometry_ref,
        raster.name(),
        count
    );

    ZonalStats {
        geometry_ref: geometry_ref.to_string(),
        raster: raster.name().to_string(),
        available: true,
        count,
        sum,
        mean: (count > 0).then(|| sum / count as f64),
        min: (count > 0).then_some(min),
        max: (count > 0).then_some(max),
        area,
    }
}

/// Per-run pool of raster handles.
///
/// Each configured source is opened at most once, on first use; every
/// later query shares the open handle. An open failure is latched so the
/// source is never retried within the run, and the failure is reported
/// per source instead of aborting the run.
pub struct RasterPool {
    sources: Vec<RasterDescriptor>,
    handles: Mutex<HashMap<String, Result<Arc<GridRaster>, String>>>,
}

impl RasterPool {
    pub fn new(sources: &[RasterDescriptor]) -> Self {
        Self {
            sources: sources.to_vec(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Configured source names, in configuration order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|d| d.name.clone()).collect()
    }

    /// Shared handle for a source, opening it on first use.
    pub fn acquire(&self, name: &str) -> Result<Arc<GridRaster>, String> {
        let mut handles = match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = handles.get(name) {
            return entry.clone();
        }

        let opened = match self.sources.iter().find(|d| d.name == name) {
            Some(descriptor) => {
                GridRaster::open_geotiff(&descriptor.name, &descriptor.path, descriptor.nodata)
                    .map(Arc::new)
                    .map_err(|e| {
                        warn!("Raster source '{}' unavailable: {}", name, e);
                        e.to_string()
                    })
            }
            None => Err(format!("unknown raster source '{}'", name)),
        };

        handles.insert(name.to_string(), opened.clone());
        opened
    }

    /// Sources that failed to open, with the open error.
    pub fn failures(&self) -> BTreeMap<String, String> {
        let handles = match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        handles
            .iter()
            .filter_map(|(name, entry)| match entry {
                Err(error) => Some((name.clone(), error.clone())),
                Ok(_) => None,
            })
            .collect()
    }
}

/// Stats for one geometry across every configured source, in configuration
/// order. Failed sources yield unavailable markers.
pub fn stats_for_geometry(
    pool: &RasterPool,
    geometry: &MultiPolygon<f64>,
    geometry_ref: &str,
) -> Vec<ZonalStats> {
    pool.source_names()
        .iter()
        .map(|name| match pool.acquire(name) {
            Ok(raster) => zonal_stats(&raster, geometry, geometry_ref),
            Err(_) => ZonalStats::unavailable(geometry_ref, name.as_str(), geometry.unsigned_area()),
        })
        .collect()
}
