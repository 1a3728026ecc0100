//! Core data models for the analysis engine.

pub mod band;
pub mod report;

pub use band::{Band, BandId, Center, Poi};
pub use report::{
    AnalysisReport, BandCoverage, CenterCoverage, CoverageResult, RegionReport, SkippedBand,
    ZonalStats,
};
