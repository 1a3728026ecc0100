//! In-memory raster grids and GeoTIFF loading.

use ndarray::Array2;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{info, warn};

/// Errors raised while opening a raster source.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The raster file could not be opened.
    #[error("failed to open raster {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The raster file could not be decoded as a TIFF.
    #[error("failed to decode raster {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    /// The raster decoded but its layout is not usable here.
    #[error("raster {path} has unsupported layout: {reason}")]
    Layout { path: PathBuf, reason: String },
}

/// Descriptor of a named raster source, as supplied by configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RasterDescriptor {
    pub name: String,
    pub path: PathBuf,
    /// Overrides the nodata value embedded in the file
    pub nodata: Option<f64>,
}

/// A single-band raster held in memory: cell values plus the affine grid
/// placing them in the same planar CRS as the band geometries.
#[derive(Debug)]
pub struct GridRaster {
    name: String,
    /// Top-left corner of cell (0, 0)
    origin_x: f64,
    origin_y: f64,
    cell_width: f64,
    cell_height: f64,
    nodata: Option<f64>,
    band: Array2<f64>,
}

impl GridRaster {
    pub fn new(
        name: impl Into<String>,
        origin_x: f64,
        origin_y: f64,
        cell_width: f64,
        cell_height: f64,
        nodata: Option<f64>,
        band: Array2<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            origin_x,
            origin_y,
            cell_width,
            cell_height,
            nodata,
            band,
        }
    }

    /// Load a single-band GeoTIFF. Grid placement comes from the
    /// ModelPixelScale and ModelTiepoint tags; the nodata value from the
    /// GDAL nodata tag unless overridden.
    pub fn open_geotiff(
        name: &str,
        path: &Path,
        nodata_override: Option<f64>,
    ) -> Result<Self, RasterError> {
        info!("Opening raster '{}' from {}", name, path.display());

        let file = File::open(path).map_err(|source| RasterError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decode_err = |source| RasterError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(decode_err)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(decode_err)?;

        let (cell_width, cell_height) = match decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag) {
            Ok(scale) if scale.len() >= 2 && scale[0] > 0.0 && scale[1] > 0.0 => {
                (scale[0], scale[1])
            }
            _ => {
                warn!(
                    "Raster '{}' carries no pixel scale, assuming unit cells",
                    name
                );
                (1.0, 1.0)
            }
        };

        let (origin_x, origin_y) = match decoder.get_tag_f64_vec(Tag::ModelTiepointTag) {
            Ok(tie) if tie.len() >= 6 => {
                // Tiepoint maps raster position (i, j) to model (x, y).
                (tie[3] - tie[0] * cell_width, tie[4] + tie[1] * cell_height)
            }
            _ => {
                warn!(
                    "Raster '{}' carries no tiepoint, anchoring grid at the origin",
                    name
                );
                (0.0, height as f64 * cell_height)
            }
        };

        let nodata = nodata_override.or_else(|| {
            decoder
                .get_tag_ascii_string(Tag::GdalNodata)
                .ok()
                .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
        });

        let values = match decoder.read_image().map_err(decode_err)? {
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
        };

        let band = Array2::from_shape_vec((height as usize, width as usize), values).map_err(
            |_| RasterError::Layout {
                path: path.to_path_buf(),
                reason: "expected a single-band raster".to_string(),
            },
        )?;

        info!(
            "Raster '{}' loaded: {}x{} cells, nodata {:?}",
            name, width, height, nodata
        );

        Ok(Self::new(
            name,
            origin_x,
            origin_y,
            cell_width,
            cell_height,
            nodata,
            band,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.band.nrows()
    }

    pub fn cols(&self) -> usize {
        self.band.ncols()
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.band[[row, col]]
    }

    /// True when the cell holds no usable value.
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.map(|nd| value == nd).unwrap_or(false)
    }

    /// Model-space center of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y - (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Rows whose cells may fall into the y-range, clamped to the grid.
    pub fn rows_overlapping(&self, min_y: f64, max_y: f64) -> std::ops::Range<usize> {
        let first = ((self.origin_y - max_y) / self.cell_height).floor().max(0.0) as usize;
        let last = ((self.origin_y - min_y) / self.cell_height).floor();
        if last < 0.0 {
            return 0..0;
        }
        first.min(self.rows())..(last as usize + 1).min(self.rows())
    }

    /// Columns whose cells may fall into the x-range, clamped to the grid.
    pub fn cols_overlapping(&self, min_x: f64, max_x: f64) -> std::ops::Range<usize> {
        let first = ((min_x - self.origin_x) / self.cell_width).floor().max(0.0) as usize;
        let last = ((max_x - self.origin_x) / self.cell_width).floor();
        if last < 0.0 {
            return 0..0;
        }
        first.min(self.cols())..(last as usize + 1).min(self.cols())
    }
}
