//! Isocover - multi-center isochrone band coverage and overlap analysis
//!
//! Given POIs, centers with isochrone bands (planar polygon geometry) and
//! optional raster sources, the engine classifies coverage, enumerates
//! non-empty band intersections and aggregates zonal statistics into a
//! single serializable report.

pub mod engine;
pub mod models;
pub mod raster;

pub use engine::{analyze, AnalysisConfig, AnalysisInput};
pub use models::{AnalysisReport, Band, BandId, Center, Poi};
pub use raster::{RasterDescriptor, RasterError};
