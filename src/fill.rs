//! NoData の穴埋め
//!
//! 等高線をラスタ化すると線上の画素しか値を持たないため、残りの画素に
//! 最も近い有効画素の値を割り当てる。最近傍の探索は厳密なユークリッド
//! 距離変換（Felzenszwalb & Huttenlocher の下側包絡線法）で行い、
//! 画素間隔は地図単位で扱う。

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::DemRaster;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOptions {
    /// 探索距離の上限（地図単位）
    pub max_search_dist: f64,
    /// 3x3 平滑化の回数
    pub smooth_iterations: usize,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            max_search_dist: 100.0,
            smooth_iterations: 0,
        }
    }
}

impl FillOptions {
    /// 探索距離は 0 以上でなければならない（`f64::INFINITY` は無制限）
    pub fn validate(&self) -> Result<()> {
        if self.max_search_dist.is_nan() || self.max_search_dist < 0.0 {
            return Err(Error::InvalidSearchDistance(self.max_search_dist));
        }
        Ok(())
    }
}

/// 各画素から最も近い有効画素までの二乗距離とその画素の位置
#[derive(Debug, Clone)]
pub struct NearestValid {
    pub sq_dist: Vec<f64>,
    pub source: Vec<usize>,
}

impl NearestValid {
    pub fn distance(&self, idx: usize) -> f64 {
        self.sq_dist[idx].sqrt()
    }

    pub fn source(&self, idx: usize) -> Option<usize> {
        self.sq_dist[idx].is_finite().then(|| self.source[idx])
    }
}

/// NoData 画素を最近傍の有効画素の値で埋め、埋めた画素数を返す。
pub fn fill_nodata(raster: &mut DemRaster, options: &FillOptions) -> Result<usize> {
    options.validate()?;
    let (rows, cols) = raster.shape();
    if raster.values.len() != rows * cols {
        return Err(Error::ShapeMismatch {
            expected: rows * cols,
            actual: raster.values.len(),
        });
    }

    let mask = raster.nodata_mask();
    if mask.iter().all(|&nodata| nodata) {
        debug!("No valid pixel to fill from");
        return Ok(0);
    }

    let nearest = nearest_valid(
        &mask,
        rows,
        cols,
        raster.grid.y_res.abs(),
        raster.grid.x_res.abs(),
    );

    let source_values = raster.values.clone();
    let mut filled = 0usize;
    for (idx, value) in raster.values.iter_mut().enumerate() {
        if !mask[idx] || nearest.distance(idx) > options.max_search_dist {
            continue;
        }
        if let Some(src) = nearest.source(idx) {
            *value = source_values[src];
            filled += 1;
        }
    }
    info!(
        "Filled {} NoData pixels (max search distance {})",
        filled, options.max_search_dist
    );

    for _ in 0..options.smooth_iterations {
        smooth(raster, &mask)?;
    }

    Ok(filled)
}

/// 3x3 の平均で平滑化する。
///
/// `mask` が真の画素（元々 NoData だった画素）は値を変えない。
/// 範囲外の近傍は端の画素で折り返し、NoData 画素は平均に含めない。
pub fn smooth(raster: &mut DemRaster, mask: &[bool]) -> Result<()> {
    let (rows, cols) = raster.shape();
    let len = rows * cols;
    if raster.values.len() != len || mask.len() != len {
        return Err(Error::ShapeMismatch {
            expected: len,
            actual: if mask.len() != len {
                mask.len()
            } else {
                raster.values.len()
            },
        });
    }
    if len == 0 {
        return Ok(());
    }
    let nodata = raster.nodata;
    let current = raster.values.clone();

    raster
        .values
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(r, out_row)| {
            for (c, out) in out_row.iter_mut().enumerate() {
                if mask[r * cols + c] {
                    continue;
                }

                let mut sum = 0.0f64;
                let mut n = 0u32;
                for dr in [-1isize, 0, 1] {
                    let nr = reflect(r, dr, rows);
                    for dc in [-1isize, 0, 1] {
                        let nc = reflect(c, dc, cols);
                        let v = current[nr * cols + nc];
                        if v == nodata || v.is_nan() {
                            continue;
                        }
                        sum += f64::from(v);
                        n += 1;
                    }
                }
                if n > 0 {
                    *out = (sum / f64::from(n)) as f32;
                }
            }
        });

    Ok(())
}

/// 1画素分の折り返し（-1 は 0、n は n-1）
fn reflect(i: usize, offset: isize, n: usize) -> usize {
    i.checked_add_signed(offset)
        .filter(|&j| j < n)
        .unwrap_or(i)
}

/// `mask` が偽の画素を有効画素として、全画素の最近傍有効画素を求める。
///
/// `row_spacing` と `col_spacing` は行方向・列方向の画素間隔。
pub fn nearest_valid(
    mask: &[bool],
    rows: usize,
    cols: usize,
    row_spacing: f64,
    col_spacing: f64,
) -> NearestValid {
    // 列ごとに最も近い有効行
    let mut col_sq = vec![f64::INFINITY; rows * cols];
    let mut col_src = vec![0usize; rows * cols];
    for c in 0..cols {
        let mut last: Option<usize> = None;
        for r in 0..rows {
            if !mask[r * cols + c] {
                last = Some(r);
            }
            if let Some(src) = last {
                let d = (r - src) as f64 * row_spacing;
                col_sq[r * cols + c] = d * d;
                col_src[r * cols + c] = src;
            }
        }
        let mut last: Option<usize> = None;
        for r in (0..rows).rev() {
            if !mask[r * cols + c] {
                last = Some(r);
            }
            if let Some(src) = last {
                let d = (src - r) as f64 * row_spacing;
                if d * d < col_sq[r * cols + c] {
                    col_sq[r * cols + c] = d * d;
                    col_src[r * cols + c] = src;
                }
            }
        }
    }

    // 行ごとに下側包絡線で二次元に拡張
    let mut sq_dist = vec![f64::INFINITY; rows * cols];
    let mut source = vec![0usize; rows * cols];
    sq_dist
        .par_chunks_mut(cols)
        .zip(source.par_chunks_mut(cols))
        .enumerate()
        .for_each(|(r, (dist_row, src_row))| {
            let f = &col_sq[r * cols..(r + 1) * cols];
            let mut arg = vec![0usize; cols];
            lower_envelope(f, col_spacing, dist_row, &mut arg);
            for (c, src) in src_row.iter_mut().enumerate() {
                let q = arg[c];
                *src = col_src[r * cols + q] * cols + q;
            }
        });

    NearestValid { sq_dist, source }
}

/// 一次元の二乗距離変換。`f` の無限大要素は候補にしない。
fn lower_envelope(f: &[f64], spacing: f64, dist: &mut [f64], arg: &mut [usize]) {
    let w = spacing * spacing;
    let mut v: Vec<usize> = Vec::with_capacity(f.len());
    let mut z: Vec<f64> = Vec::with_capacity(f.len());

    let intersect = |a: usize, b: usize| -> f64 {
        let (af, bf) = (a as f64, b as f64);
        ((f[b] + w * bf * bf) - (f[a] + w * af * af)) / (2.0 * w * (bf - af))
    };

    for q in 0..f.len() {
        if !f[q].is_finite() {
            continue;
        }
        let mut s = f64::NEG_INFINITY;
        while let Some(&last) = v.last() {
            s = intersect(last, q);
            if s <= z[z.len() - 1] {
                v.pop();
                z.pop();
                s = f64::NEG_INFINITY;
            } else {
                break;
            }
        }
        v.push(q);
        z.push(s);
    }

    if v.is_empty() {
        dist.iter_mut().for_each(|d| *d = f64::INFINITY);
        return;
    }

    let mut k = 0usize;
    for p in 0..f.len() {
        while k + 1 < v.len() && z[k + 1] < p as f64 {
            k += 1;
        }
        let q = v[k];
        let d = (p as f64 - q as f64) * spacing;
        dist[p] = d * d + f[q];
        arg[p] = q;
    }
}
