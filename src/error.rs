use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not opened: {}", .0.display())]
    Open(PathBuf),

    #[error("dataset has no layer: {}", .0.display())]
    NoLayer(PathBuf),

    #[error("'{field}' field not found. Available fields: {}", .available.join(", "))]
    FieldNotFound {
        field: String,
        available: Vec<String>,
    },

    #[error("projection information not found")]
    MissingSpatialRef,

    #[error("no valid elevation value found in '{0}'")]
    NoElevations(String),

    #[error("invalid resolution: {0}")]
    InvalidResolution(f64),

    #[error("invalid search distance: {0}")]
    InvalidSearchDistance(f64),

    #[error("raster grid would be empty: {cols}x{rows} pixels")]
    EmptyGrid { cols: usize, rows: usize },

    #[error("rasterization produced no valid pixel")]
    NothingBurned,

    #[error("raster has {actual} cells, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
