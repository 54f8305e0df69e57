use crate::error::{Error, Result};

/// 北が上のラスタグリッド
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub x_min: f64,
    pub y_max: f64,
    pub x_res: f64,
    pub y_res: f64,
    pub cols: usize,
    pub rows: usize,
}

impl GridSpec {
    /// ベクタの範囲と解像度からグリッドを決める。
    ///
    /// 画素数は `(max - min) / resolution` の切り捨てで、範囲の端の端数は落とす。
    pub fn from_extent(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        resolution: f64,
    ) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(Error::InvalidResolution(resolution));
        }

        let cols = pixel_count(x_max - x_min, resolution);
        let rows = pixel_count(y_max - y_min, resolution);
        if cols == 0 || rows == 0 {
            return Err(Error::EmptyGrid { cols, rows });
        }

        Ok(Self {
            x_min,
            y_max,
            x_res: resolution,
            y_res: resolution,
            cols,
            rows,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        [self.x_min, self.x_res, 0.0, self.y_max, 0.0, -self.y_res]
    }
}

fn pixel_count(span: f64, resolution: f64) -> usize {
    let n = span / resolution;
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extent_truncates() {
        let grid = GridSpec::from_extent(500_000.0, 500_105.0, 4_200_000.0, 4_200_049.9, 10.0)
            .unwrap();
        assert_eq!(grid.cols, 10);
        assert_eq!(grid.rows, 4);
        assert_eq!(grid.shape(), (4, 10));
        assert_eq!(grid.len(), 40);
    }

    #[test]
    fn test_geo_transform_layout() {
        let grid = GridSpec::from_extent(100.0, 200.0, 50.0, 80.0, 10.0).unwrap();
        assert_eq!(grid.geo_transform(), [100.0, 10.0, 0.0, 80.0, 0.0, -10.0]);
        assert_eq!((grid.cols, grid.rows), (10, 3));
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(matches!(
            GridSpec::from_extent(0.0, 10.0, 0.0, 10.0, 0.0),
            Err(Error::InvalidResolution(_))
        ));
        assert!(matches!(
            GridSpec::from_extent(0.0, 10.0, 0.0, 10.0, f64::NAN),
            Err(Error::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_extent_smaller_than_pixel() {
        let result = GridSpec::from_extent(0.0, 5.0, 0.0, 100.0, 10.0);
        assert!(matches!(
            result,
            Err(Error::EmptyGrid { cols: 0, rows: 10 })
        ));
    }
}
