//! 等高線から DEM を作成する

use std::fs;
use std::path::Path;

use gdal::raster::{rasterize, RasterizeOptions};
use gdal::vector::{Geometry, LayerAccess};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::field::numeric_value;
use crate::fill::{fill_nodata, FillOptions};
use crate::grid::GridSpec;
use crate::inspect::{field_names, first_layer, open_vector};
use crate::model::{RasterStats, DEFAULT_NODATA};
use crate::writer::GeoTiffWriter;

pub const DEFAULT_Z_FIELD: &str = "YUKS_NUM";

#[derive(Debug, Clone, PartialEq)]
pub struct DemOptions {
    /// 画素サイズ（地図単位）
    pub resolution: f64,
    /// 標高を持つ属性フィールド
    pub z_field: String,
    pub nodata: f32,
    /// 線が触れた画素をすべて塗る
    pub all_touched: bool,
    pub fill: FillOptions,
}

impl Default for DemOptions {
    fn default() -> Self {
        Self {
            resolution: 10.0,
            z_field: DEFAULT_Z_FIELD.to_string(),
            nodata: DEFAULT_NODATA,
            all_touched: true,
            fill: FillOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemSummary {
    pub cols: usize,
    pub rows: usize,
    pub burned_pixels: usize,
    pub filled_pixels: usize,
    pub stats: Option<RasterStats>,
}

/// 等高線レイヤーを DEM GeoTIFF に変換する
pub fn contours_to_dem(input: &Path, output: &Path, options: &DemOptions) -> Result<DemSummary> {
    options.fill.validate()?;

    info!("{} opening file...", input.display());
    let dataset = open_vector(input, false)?;
    let mut layer = first_layer(&dataset, input)?;
    info!("{} curves found.", layer.feature_count());

    // 標高フィールドの確認
    let z_field = options.z_field.as_str();
    let z_idx = layer
        .defn()
        .field_index(z_field)
        .map_err(|_| Error::FieldNotFound {
            field: z_field.to_string(),
            available: field_names(&layer),
        })?;

    let srs = layer.spatial_ref().ok_or(Error::MissingSpatialRef)?;
    let projection_wkt = srs.to_wkt()?;

    let extent = layer.get_extent()?;
    let (x_min, x_max, y_min, y_max) = (extent.MinX, extent.MaxX, extent.MinY, extent.MaxY);
    info!(
        "Data extent: X({:.2}, {:.2}), Y({:.2}, {:.2})",
        x_min, x_max, y_min, y_max
    );

    let (geometries, burn_values) = collect_contours(&mut layer, z_idx);
    let Some((min_elev, max_elev)) = value_range(&burn_values) else {
        return Err(Error::NoElevations(z_field.to_string()));
    };
    info!(
        "Elevation range: Min={:.2}, Max={:.2}",
        min_elev, max_elev
    );

    let grid = GridSpec::from_extent(x_min, x_max, y_min, y_max, options.resolution)?;
    info!("DEM size: {}x{} pixels", grid.cols, grid.rows);

    // 出力ディレクトリの作成
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            info!("Created output directory: {}", dir.display());
        }
    }

    info!("Creating DEM file...");
    let writer = GeoTiffWriter::new();
    let mut dem_ds = writer.create(&grid, &projection_wkt, options.nodata, output)?;

    info!("Rasterizing contours...");
    let rasterize_options = RasterizeOptions {
        all_touched: options.all_touched,
        ..Default::default()
    };
    rasterize(
        &mut dem_ds,
        &[1],
        &geometries,
        &burn_values,
        Some(rasterize_options),
    )?;

    let mut raster = writer.read(&dem_ds, &grid, options.nodata)?;
    let burned_pixels = raster.valid_pixels();
    info!(
        "Rasterization completed. {} valid pixels created.",
        burned_pixels
    );
    let Some(burned) = raster.stats() else {
        return Err(Error::NothingBurned);
    };
    info!(
        "Raster value range: Min={:.2}, Max={:.2}",
        burned.min, burned.max
    );

    info!("Filling NoData areas...");
    let mut filled_pixels = 0;
    let raw = raster.clone();
    match fill_nodata(&mut raster, &options.fill) {
        Ok(n) => filled_pixels = n,
        Err(e) => {
            warn!("DEM filling failed, keeping raw DEM: {}", e);
            raster = raw;
        }
    }

    let band_stats = writer.write_band(&mut dem_ds, &raster)?;
    dem_ds.flush_cache()?;

    info!("DEM created: {}", output.display());
    if let Some(band_stats) = &band_stats {
        info!(
            "Final DEM statistics: Min={:.2}, Max={:.2}",
            band_stats.min, band_stats.max
        );
    }
    let stats = raster.stats();

    Ok(DemSummary {
        cols: grid.cols,
        rows: grid.rows,
        burned_pixels,
        filled_pixels,
        stats,
    })
}

/// 標高値を持つ地物のジオメトリと標高を集める。標高が数値でない地物は除外する。
fn collect_contours<L: LayerAccess>(layer: &mut L, z_idx: usize) -> (Vec<Geometry>, Vec<f64>) {
    let mut geometries = Vec::new();
    let mut burn_values = Vec::new();
    let mut skipped = 0usize;

    layer.reset_feature_reading();
    for feature in layer.features() {
        let elevation = feature
            .field(z_idx)
            .ok()
            .flatten()
            .as_ref()
            .and_then(numeric_value);

        match (feature.geometry(), elevation) {
            (Some(geometry), Some(z)) if z.is_finite() => {
                geometries.push(geometry.clone());
                burn_values.push(z);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} features without geometry or elevation", skipped);
    }
    (geometries, burn_values)
}

fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(&[]), None);
        assert_eq!(value_range(&[120.0]), Some((120.0, 120.0)));
        assert_eq!(
            value_range(&[150.0, 90.0, 310.0, 200.0]),
            Some((90.0, 310.0))
        );
    }

    #[test]
    fn test_default_options() {
        let options = DemOptions::default();
        assert_eq!(options.resolution, 10.0);
        assert_eq!(options.z_field, "YUKS_NUM");
        assert_eq!(options.nodata, -9999.0);
        assert!(options.all_touched);
        assert_eq!(options.fill.max_search_dist, 100.0);
        assert_eq!(options.fill.smooth_iterations, 0);
    }

    #[test]
    fn test_invalid_search_distance_rejected_before_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = DemOptions {
            fill: FillOptions {
                max_search_dist: f64::NAN,
                smooth_iterations: 0,
            },
            ..Default::default()
        };
        let result = contours_to_dem(
            &dir.path().join("missing.shp"),
            &dir.path().join("dem.tif"),
            &options,
        );
        assert!(matches!(result, Err(Error::InvalidSearchDistance(_))));
        assert!(!dir.path().join("dem.tif").exists());
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = contours_to_dem(
            &dir.path().join("missing.shp"),
            &dir.path().join("dem.tif"),
            &DemOptions::default(),
        );
        assert!(matches!(result, Err(Error::Open(_))));
    }
}
