use crate::error::{Error, Result};
use crate::grid::GridSpec;

pub const DEFAULT_NODATA: f32 = -9999.0;

/// 単バンドの標高ラスタ（行優先）
#[derive(Debug, Clone, PartialEq)]
pub struct DemRaster {
    pub grid: GridSpec,
    pub values: Vec<f32>,
    pub nodata: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStats {
    pub valid_pixels: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
}

impl DemRaster {
    pub fn from_values(grid: GridSpec, values: Vec<f32>, nodata: f32) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(Error::ShapeMismatch {
                expected: grid.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            grid,
            values,
            nodata,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        value == self.nodata || value.is_nan()
    }

    pub fn nodata_mask(&self) -> Vec<bool> {
        self.values.iter().map(|&v| self.is_nodata(v)).collect()
    }

    pub fn valid_pixels(&self) -> usize {
        self.values.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    /// NoData 以外の画素の統計。有効画素がなければ `None`。
    pub fn stats(&self) -> Option<RasterStats> {
        let mut valid_pixels = 0usize;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;

        for &value in &self.values {
            if self.is_nodata(value) {
                continue;
            }
            valid_pixels += 1;
            min = min.min(value);
            max = max.max(value);
            sum += f64::from(value);
        }

        if valid_pixels == 0 {
            return None;
        }

        Some(RasterStats {
            valid_pixels,
            min,
            max,
            mean: sum / valid_pixels as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cols: usize, rows: usize) -> GridSpec {
        GridSpec {
            x_min: 0.0,
            y_max: rows as f64,
            x_res: 1.0,
            y_res: 1.0,
            cols,
            rows,
        }
    }

    #[test]
    fn test_stats_skip_nodata() {
        let raster = DemRaster::from_values(
            grid(3, 2),
            vec![DEFAULT_NODATA, 100.0, 120.0, DEFAULT_NODATA, 110.0, f32::NAN],
            DEFAULT_NODATA,
        )
        .unwrap();

        let stats = raster.stats().unwrap();
        assert_eq!(stats.valid_pixels, 3);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 120.0);
        assert!((stats.mean - 110.0).abs() < 1e-9);
        assert_eq!(raster.valid_pixels(), 3);
    }

    #[test]
    fn test_stats_all_nodata() {
        let raster =
            DemRaster::from_values(grid(2, 2), vec![DEFAULT_NODATA; 4], DEFAULT_NODATA).unwrap();
        assert!(raster.stats().is_none());
        assert_eq!(raster.nodata_mask(), vec![true; 4]);
    }

    #[test]
    fn test_from_values_shape_mismatch() {
        let result = DemRaster::from_values(grid(2, 2), vec![1.0; 3], DEFAULT_NODATA);
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }
}
