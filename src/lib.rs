pub mod contour;
pub mod error;
pub mod field;
pub mod fill;
pub mod grid;
pub mod inspect;
pub mod model;
pub mod writer;

pub use contour::{contours_to_dem, DemOptions, DemSummary};
pub use error::{Error, Result};
pub use fill::FillOptions;
pub use grid::GridSpec;
pub use model::{DemRaster, RasterStats};
pub use writer::GeoTiffWriter;
