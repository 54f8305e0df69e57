//! シェープファイルの属性・座標系・ジオメトリ型の確認と属性変換

use std::path::{Path, PathBuf};

use gdal::vector::{field_type_to_name, geometry_type_to_name, Layer, LayerAccess, OGRFieldType};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::field::numeric_value;

pub const DEFAULT_SOURCE_FIELD: &str = "YUKSEKLIK";
pub const DEFAULT_TARGET_FIELD: &str = "ELEV";

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionInfo {
    pub epsg: Option<i32>,
    pub wkt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldTypeInfo {
    /// データセット上のフィールド名
    pub field: String,
    pub field_type: OGRFieldType::Type,
    /// OGR の型名（"Real", "String" など）
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryInfo {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub converted: usize,
    pub nulled: usize,
    pub field_created: bool,
}

/// ベクタデータセットを開く。`update` が真なら書き込みモード。
pub fn open_vector(path: &Path, update: bool) -> Result<Dataset> {
    let mut open_flags = GdalOpenFlags::GDAL_OF_VECTOR;
    if update {
        open_flags |= GdalOpenFlags::GDAL_OF_UPDATE;
    }
    let options = DatasetOptions {
        open_flags,
        ..Default::default()
    };

    Dataset::open_ex(path, options).map_err(|e| {
        warn!("File not opened: {} ({})", path.display(), e);
        Error::Open(path.to_path_buf())
    })
}

pub(crate) fn first_layer<'a>(dataset: &'a Dataset, path: &Path) -> Result<Layer<'a>> {
    dataset
        .layer(0)
        .map_err(|_| Error::NoLayer(PathBuf::from(path)))
}

pub(crate) fn field_names(layer: &Layer) -> Vec<String> {
    layer.defn().fields().map(|field| field.name()).collect()
}

fn field_not_found(layer: &Layer, field: &str) -> Error {
    Error::FieldNotFound {
        field: field.to_string(),
        available: field_names(layer),
    }
}

/// `old_field` の値を実数に変換して `new_field` に書き込む。
///
/// `new_field` がなければ Real 型で作成する。数値に変換できない値は NULL になる。
pub fn convert_field_to_numeric(
    path: &Path,
    old_field: &str,
    new_field: &str,
) -> Result<ConversionReport> {
    let dataset = open_vector(path, true)?;
    let mut layer = first_layer(&dataset, path)?;
    let mut report = ConversionReport::default();

    let src_idx = layer
        .defn()
        .field_index(old_field)
        .map_err(|_| field_not_found(&layer, old_field))?;

    if layer.defn().field_index(new_field).is_err() {
        layer.create_defn_fields(&[(new_field, OGRFieldType::OFTReal)])?;
        report.field_created = true;
        debug!("Created field '{}'", new_field);
    }
    let dst_idx = layer.defn().field_index(new_field)?;

    // 走査中はレイヤーを更新できないため、先に変換結果を集める
    let mut updates = Vec::new();
    for feature in layer.features() {
        let Some(fid) = feature.fid() else {
            continue;
        };
        let value = feature
            .field(src_idx)?
            .as_ref()
            .and_then(numeric_value);
        updates.push((fid, value));
    }

    for (fid, value) in updates {
        let Some(mut feature) = layer.feature(fid) else {
            continue;
        };
        match value {
            Some(v) => {
                feature.set_field_double(dst_idx, v)?;
                report.converted += 1;
            }
            None => {
                feature.set_field_null(dst_idx)?;
                report.nulled += 1;
            }
        }
        layer.set_feature(feature)?;
    }

    info!(
        "'{}' -> '{}' completed conversion ({} converted, {} null)",
        old_field, new_field, report.converted, report.nulled
    );
    Ok(report)
}

/// レイヤーの座標系と EPSG コード
pub fn projection_info(path: &Path) -> Result<ProjectionInfo> {
    let dataset = open_vector(path, false)?;
    let layer = first_layer(&dataset, path)?;

    let Some(mut srs) = layer.spatial_ref() else {
        warn!("projection information not found: {}", path.display());
        return Err(Error::MissingSpatialRef);
    };

    if let Err(e) = srs.auto_identify_epsg() {
        debug!("EPSG auto identification failed: {}", e);
    }
    let epsg = srs.auth_code().ok();
    let wkt = srs.to_wkt()?;

    Ok(ProjectionInfo { epsg, wkt })
}

/// フィールドの型。フィールド名の大文字・小文字は区別しない。
pub fn check_field_type(path: &Path, field: &str) -> Result<FieldTypeInfo> {
    let dataset = open_vector(path, false)?;
    let layer = first_layer(&dataset, path)?;

    let idx = layer
        .defn()
        .field_index(field)
        .map_err(|_| field_not_found(&layer, field))?;
    let found = layer
        .defn()
        .fields()
        .nth(idx)
        .ok_or_else(|| field_not_found(&layer, field))?;

    let field_type = found.field_type();
    Ok(FieldTypeInfo {
        field: found.name(),
        field_type,
        type_name: field_type_to_name(field_type),
    })
}

/// レイヤーのジオメトリ型
pub fn detect_geometry_type(path: &Path) -> Result<GeometryInfo> {
    let dataset = open_vector(path, false)?;
    let layer = first_layer(&dataset, path)?;

    let name = layer
        .defn()
        .geom_fields()
        .next()
        .map(|geom_field| geometry_type_to_name(geom_field.field_type()))
        .unwrap_or_else(|| "None".to_string());

    Ok(GeometryInfo { name })
}

pub fn gdal_version() -> String {
    gdal::version::version_info("RELEASE_NAME")
}
