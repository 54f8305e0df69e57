use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contour_dem::inspect::{self, DEFAULT_SOURCE_FIELD, DEFAULT_TARGET_FIELD};
use contour_dem::{contours_to_dem, DemOptions, FillOptions};
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 座標系・フィールド型・ジオメトリ型を表示
    Inspect {
        /// 入力シェープファイル
        #[arg(value_name = "SHP")]
        input: PathBuf,

        /// 型を確認するフィールド
        #[arg(long, default_value = DEFAULT_TARGET_FIELD)]
        field: String,
    },

    /// 文字列の標高フィールドを実数フィールドに変換
    ConvertField {
        /// 入力シェープファイル（上書きされる）
        #[arg(value_name = "SHP")]
        input: PathBuf,

        /// 変換元フィールド
        #[arg(long, default_value = DEFAULT_SOURCE_FIELD)]
        from: String,

        /// 変換先フィールド
        #[arg(long, default_value = DEFAULT_TARGET_FIELD)]
        to: String,
    },

    /// 等高線から DEM GeoTIFF を作成
    Dem(DemArgs),
}

#[derive(clap::Args, Debug)]
struct DemArgs {
    /// 入力シェープファイル、またはディレクトリ
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// 出力GeoTIFF（入力がディレクトリの場合は出力ディレクトリ）
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// 画素サイズ（地図単位）
    #[arg(short, long, default_value_t = 10.0)]
    resolution: f64,

    /// 標高フィールド
    #[arg(short, long, default_value = contour_dem::contour::DEFAULT_Z_FIELD)]
    z_field: String,

    /// NoData を埋める最大探索距離（地図単位）
    #[arg(long, default_value_t = 100.0)]
    max_search_dist: f64,

    /// 平滑化の回数
    #[arg(long, default_value_t = 0)]
    smooth_iterations: usize,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,
}

impl DemArgs {
    fn options(&self) -> DemOptions {
        DemOptions {
            resolution: self.resolution,
            z_field: self.z_field.clone(),
            fill: FillOptions {
                max_search_dist: self.max_search_dist,
                smooth_iterations: self.smooth_iterations,
            },
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    match &args.command {
        Command::Inspect { input, field } => run_inspect(input, field)?,
        Command::ConvertField { input, from, to } => {
            let report = inspect::convert_field_to_numeric(input, from, to)
                .with_context(|| format!("Failed to convert field in {:?}", input))?;
            println!(
                "'{}' → '{}' completed conversion. ({} converted, {} null)",
                from, to, report.converted, report.nulled
            );
        }
        Command::Dem(dem) => run_dem(dem)?,
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn run_inspect(input: &Path, field: &str) -> Result<()> {
    match inspect::projection_info(input) {
        Ok(info) => match info.epsg {
            Some(code) => println!("EPSG code: EPSG:{}", code),
            None => println!("EPSG Code not found"),
        },
        Err(e) => println!("{}: {}", e, input.display()),
    }
    println!("{}", "-".repeat(25));

    match inspect::check_field_type(input, field) {
        Ok(info) => println!(
            "{}  '{}' field type: {}",
            input.display(),
            info.field,
            info.type_name
        ),
        Err(e) => println!("{}: {}", e, input.display()),
    }
    println!("{}", "-".repeat(60));

    let geometry = inspect::detect_geometry_type(input)?;
    println!("{} geometry: {}", input.display(), geometry.name);
    println!("{}", "-".repeat(30));

    println!("GDAL version: {}", inspect::gdal_version());
    Ok(())
}

fn run_dem(args: &DemArgs) -> Result<()> {
    // スレッドプールの設定
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let options = args.options();

    if args.input.is_file() {
        info!("Processing shapefile: {:?}", args.input);
        process_file(&args.input, &args.output, &options)?;
    } else if args.input.is_dir() {
        // ディレクトリの処理
        info!("Processing directory: {:?}", args.input);
        fs::create_dir_all(&args.output)?;
        process_directory(&args.input, &args.output, &options)?;
    } else {
        error!("Invalid input path: {:?}", args.input);
        anyhow::bail!("Input path must be a file or directory");
    }

    Ok(())
}

fn process_file(input: &Path, output: &Path, options: &DemOptions) -> Result<()> {
    let summary = contours_to_dem(input, output, options)
        .with_context(|| format!("Failed to create DEM from {:?}", input))?;

    info!(
        "Written DEM: {:?} ({}x{}, {} burned, {} filled)",
        output, summary.cols, summary.rows, summary.burned_pixels, summary.filled_pixels
    );
    Ok(())
}

fn process_directory(dir: &Path, output_dir: &Path, options: &DemOptions) -> Result<()> {
    use rayon::prelude::*;

    // シェープファイルを再帰的に収集
    let input_files = collect_shapefiles(dir)?;
    info!("Found {} shapefiles", input_files.len());

    let outputs = output_paths(dir, output_dir, &input_files)?;

    // 並列処理でファイルを変換
    let results: Vec<Result<()>> = input_files
        .par_iter()
        .zip(outputs.par_iter())
        .map(|(path, output)| process_file(path, output, options))
        .collect();

    // エラーをチェック
    let mut errors = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            errors.push(format!("{}: {:#}", input_files[i].display(), e));
        }
    }

    if !errors.is_empty() {
        error!("Failed to process {} files:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} files failed to process", errors.len());
    }

    Ok(())
}

/// 入力ディレクトリからの相対パスを出力ディレクトリ以下に再現する
fn output_path_for(dir: &Path, output_dir: &Path, input: &Path) -> PathBuf {
    let relative = input
        .strip_prefix(dir)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| input.file_name().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("dem"));
    output_dir.join(relative).with_extension("tif")
}

/// 出力先が重なる入力があればエラー
fn output_paths(dir: &Path, output_dir: &Path, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashMap::new();
    let mut outputs = Vec::with_capacity(inputs.len());

    for input in inputs {
        let output = output_path_for(dir, output_dir, input);
        if let Some(previous) = seen.insert(output.clone(), input) {
            anyhow::bail!(
                "{:?} and {:?} would both be written to {:?}",
                previous,
                input,
                output
            );
        }
        outputs.push(output);
    }

    Ok(outputs)
}

fn collect_shapefiles(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            // サブディレクトリを再帰的に探索
            files.extend(collect_shapefiles(&path)?);
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"))
        {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dem_args_defaults() {
        let args = Args::parse_from(["contour-dem", "dem", "a1.shp", "-o", "dem_1.tif"]);
        let Command::Dem(dem) = args.command else {
            panic!("expected dem subcommand");
        };
        let options = dem.options();
        assert_eq!(options.resolution, 10.0);
        assert_eq!(options.z_field, "YUKS_NUM");
        assert_eq!(options.fill.max_search_dist, 100.0);
        assert_eq!(options.fill.smooth_iterations, 0);
        assert!(dem.threads.is_none());
    }

    #[test]
    fn test_convert_field_defaults() {
        let args = Args::parse_from(["contour-dem", "convert-field", "a1.shp"]);
        match args.command {
            Command::ConvertField { from, to, .. } => {
                assert_eq!(from, "YUKSEKLIK");
                assert_eq!(to, "ELEV");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_collect_shapefiles() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let nested = dir.join("sheet_b");
        fs::create_dir_all(&nested).unwrap();
        for path in [
            dir.join("a1.shp"),
            dir.join("a1.dbf"),
            nested.join("b2.SHP"),
            nested.join("notes.txt"),
        ] {
            fs::write(path, b"").unwrap();
        }

        let files = collect_shapefiles(dir).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("a1.shp")));
        assert!(files.iter().any(|p| p.ends_with("sheet_b/b2.SHP")));
    }

    #[test]
    fn test_same_name_in_subdirectories_gets_separate_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        for sheet in ["sheet_a", "sheet_b"] {
            fs::create_dir_all(dir.join(sheet)).unwrap();
            fs::write(dir.join(sheet).join("a1.shp"), b"").unwrap();
        }

        let files = collect_shapefiles(dir).unwrap();
        let outputs = output_paths(dir, Path::new("/out"), &files).unwrap();

        assert_eq!(
            outputs,
            vec![
                PathBuf::from("/out/sheet_a/a1.tif"),
                PathBuf::from("/out/sheet_b/a1.tif"),
            ]
        );
    }

    #[test]
    fn test_colliding_outputs_rejected() {
        let dir = Path::new("/data");
        let inputs = vec![dir.join("a1.shp"), dir.join("a1.SHP")];

        let err = output_paths(dir, Path::new("/out"), &inputs).unwrap_err();
        assert!(err.to_string().contains("a1.tif"));
    }
}
