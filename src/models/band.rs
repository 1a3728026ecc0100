//! Input types for one analysis run: POIs, centers and isochrone bands.

use geo::{BoundingRect, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point of interest to classify against the band set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    /// Unique POI identifier
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Additional POI attributes (e.g. a "production" value)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Poi {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            metadata: HashMap::new(),
        }
    }

    /// Numeric "production" attribute, if the POI carries one.
    pub fn production(&self) -> Option<f64> {
        self.metadata.get("production")?.trim().parse().ok()
    }
}

/// A source location from which isochrone bands were generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Center {
    /// Unique center identifier
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Capacity threshold checked against the production sum of covered POIs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_production: Option<f64>,
}

impl Center {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            max_production: None,
        }
    }
}

/// Identity of a band: the owning center plus the ring position.
///
/// The derived ordering (center id, then band index) is the canonical
/// ordering used for participant sets and report output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BandId {
    pub center: String,
    pub index: u32,
}

impl BandId {
    pub fn new(center: impl Into<String>, index: u32) -> Self {
        Self {
            center: center.into(),
            index,
        }
    }

    /// Stable reference string, used to key zonal stats to geometries.
    pub fn key(&self) -> String {
        format!("{}#{}", self.center, self.index)
    }
}

impl std::fmt::Display for BandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.center, self.index)
    }
}

/// One concentric ring of a center's isochrone, with planar-projected geometry.
///
/// Bands of a single center are non-overlapping by construction; bands of
/// different centers may overlap arbitrarily.
#[derive(Debug, Clone)]
pub struct Band {
    pub id: BandId,
    /// Lower bound of the ring (time or distance, same unit across the run)
    pub lower: f64,
    /// Upper bound of the ring, strictly greater than `lower`
    pub upper: f64,
    pub geometry: MultiPolygon<f64>,
}

impl Band {
    pub fn new(id: BandId, lower: f64, upper: f64, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            lower,
            upper,
            geometry,
        }
    }

    /// Build a band from a single polygon, normalizing to a multipolygon.
    pub fn from_polygon(id: BandId, lower: f64, upper: f64, polygon: Polygon<f64>) -> Self {
        Self::new(id, lower, upper, MultiPolygon::new(vec![polygon]))
    }

    /// Human-readable label, e.g. `"C1_10"` for the ring reaching out to 10.
    pub fn label(&self) -> String {
        format!("{}_{}", self.id.center, format_bound(self.upper))
    }

    /// Bounding box of the band geometry, `None` for an empty geometry.
    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Format a band bound without trailing zeros ("10", "0.5", "1.25").
fn format_bound(value: f64) -> String {
    if value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
