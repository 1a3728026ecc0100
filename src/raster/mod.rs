//! Raster sources and zonal aggregation.
//!
//! A raster source is opened once per analysis run and the open handle is
//! shared across every band and region queried against it.

mod source;
mod zonal;

pub use source::{GridRaster, RasterDescriptor, RasterError};
pub use zonal::{stats_for_geometry, zonal_stats, RasterPool};
