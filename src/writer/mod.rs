use gdal::raster::{Buffer, StatisticsAll};
use gdal::{Dataset, DriverManager};
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::GridSpec;
use crate::model::DemRaster;

#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Float32 単バンドの GeoTIFF を作り、全画素を NoData で初期化する
    pub fn create(
        &self,
        grid: &GridSpec,
        projection_wkt: &str,
        nodata: f32,
        output_path: &Path,
    ) -> Result<Dataset> {
        // GTiffドライバーを取得
        let driver = DriverManager::get_driver_by_name("GTiff")?;

        let (rows, cols) = grid.shape();
        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path,
            cols,
            rows,
            1, // バンド数
        )?;

        // 座標系とジオトランスフォームを設定
        dataset.set_projection(projection_wkt)?;
        dataset.set_geo_transform(&grid.geo_transform())?;

        {
            let mut band = dataset.rasterband(1)?;
            band.set_no_data_value(Some(f64::from(nodata)))?;
            band.fill(f64::from(nodata), None)?;
        }

        Ok(dataset)
    }

    /// バンド1を読み込む
    pub fn read(&self, dataset: &Dataset, grid: &GridSpec, nodata: f32) -> Result<DemRaster> {
        let (rows, cols) = grid.shape();
        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<f32>((0, 0), (cols, rows), (cols, rows), None)?;
        let (_, values) = buffer.into_shape_and_vec();

        DemRaster::from_values(*grid, values, nodata)
    }

    /// バンド1へ書き込み、GDAL に統計値を計算させる。
    ///
    /// 統計値は `STATISTICS_*` メタデータとしてバンドに保存される。
    /// 有効画素がなければ `None`。
    pub fn write_band(
        &self,
        dataset: &mut Dataset,
        raster: &DemRaster,
    ) -> Result<Option<StatisticsAll>> {
        let (rows, cols) = raster.shape();
        if raster.values.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                expected: rows * cols,
                actual: raster.values.len(),
            });
        }

        let mut band = dataset.rasterband(1)?;

        // データを書き込み（GDALは行優先順を期待）
        let mut buffer = Buffer::new((cols, rows), raster.values.clone());
        band.write((0, 0), (cols, rows), &mut buffer)?;

        if raster.valid_pixels() == 0 {
            return Ok(None);
        }
        Ok(band.get_statistics(true, false)?)
    }
}
