//! formgrid CLI — template grid inspection, page alignment, and cell extraction.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use formgrid::{
    load_pages, CellOutcome, CellSpan, ExtractMode, FormPipeline, LowConfidenceFallback,
    MatcherKind, PageResult, PipelineConfig, RegistrationReport,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "formgrid")]
#[command(about = "Register scanned form pages against a reference template and crop answer cells")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the cell grid of a template image and write it as JSON.
    Grid(CliGridArgs),

    /// Rectify every page of a scan into the template frame.
    Align(CliAlignArgs),

    /// Crop the configured cell span from every page of a scan.
    Extract(CliExtractArgs),
}

#[derive(Debug, Clone, Args)]
struct CliGridArgs {
    /// Path to the reference template image.
    #[arg(long)]
    template: PathBuf,

    /// Path to write the discovered grid (JSON).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    grid: CliGridParams,
}

#[derive(Debug, Clone, Args)]
struct CliGridParams {
    /// Minimum contour bounding-box height in pixels.
    #[arg(long, default_value = "20")]
    min_box_height: u32,

    /// Minimum contour bounding-box area in pixels.
    #[arg(long, default_value = "1000")]
    min_box_area: u32,

    /// Maximum y-gap between boxes of the same row.
    #[arg(long, default_value = "15")]
    row_tolerance: u32,
}

#[derive(Debug, Clone, Args)]
struct CliAlignArgs {
    /// Path to the reference template image.
    #[arg(long)]
    template: PathBuf,

    /// Path to the scan (multi-page TIFF, or any single-page raster).
    #[arg(long)]
    input: PathBuf,

    /// Directory for rectified page images and the alignment report.
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    registration: CliRegistrationParams,
}

#[derive(Debug, Clone, Args)]
struct CliExtractArgs {
    /// Path to the reference template image.
    #[arg(long)]
    template: PathBuf,

    /// Path to the scan (multi-page TIFF, or any single-page raster).
    #[arg(long)]
    input: PathBuf,

    /// Directory for cell crops and the extraction report.
    #[arg(long)]
    out_dir: PathBuf,

    /// Grid row holding the answer cells.
    #[arg(long, default_value = "13")]
    row: usize,

    /// First box of the row to take.
    #[arg(long, default_value = "1")]
    start_col: usize,

    /// Number of consecutive boxes.
    #[arg(long, default_value = "8")]
    count: usize,

    /// Comma-separated cell labels, one per box of the span.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "and,or,not,nand,nor,xor,xnor,buffer"
    )]
    labels: Vec<String>,

    /// Inward padding applied to every crop, in pixels.
    #[arg(long, default_value = "0")]
    padding: u32,

    /// Extraction strategy.
    #[arg(long, value_enum, default_value_t = ModeArg::MapThenCrop)]
    mode: ModeArg,

    /// Skip pages whose registration fails instead of cropping them
    /// at template coordinates.
    #[arg(long)]
    skip_low_confidence: bool,

    #[command(flatten)]
    grid: CliGridParams,

    #[command(flatten)]
    registration: CliRegistrationParams,
}

#[derive(Debug, Clone, Args)]
struct CliRegistrationParams {
    /// Feature matching strategy.
    #[arg(long, value_enum, default_value_t = MatcherArg::Binary)]
    matcher: MatcherArg,

    /// FAST corner detection threshold.
    #[arg(long, default_value = "25")]
    fast_threshold: u8,

    /// Minimum matches required before fitting a homography.
    #[arg(long, default_value = "10")]
    min_matches: usize,

    /// RANSAC inlier threshold in pixels.
    #[arg(long, default_value = "5.0")]
    ransac_thresh_px: f64,

    /// Maximum RANSAC iterations.
    #[arg(long, default_value = "2000")]
    ransac_iters: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatcherArg {
    /// Binary descriptors, Hamming distance, mutual cross-check.
    Binary,
    /// Float descriptors, 2-NN search, Lowe ratio test.
    RatioTest,
}

impl From<MatcherArg> for MatcherKind {
    fn from(arg: MatcherArg) -> Self {
        match arg {
            MatcherArg::Binary => MatcherKind::Binary,
            MatcherArg::RatioTest => MatcherKind::RatioTest,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Project each cell box into the scanned page and crop there.
    MapThenCrop,
    /// Rectify the whole page first, then crop at template coordinates.
    WarpThenCrop,
}

impl From<ModeArg> for ExtractMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::MapThenCrop => ExtractMode::MapThenCrop,
            ModeArg::WarpThenCrop => ExtractMode::WarpThenCrop,
        }
    }
}

impl CliGridParams {
    fn to_params(&self) -> formgrid::grid::GridParams {
        formgrid::grid::GridParams {
            min_box_height: self.min_box_height,
            min_box_area: self.min_box_area,
            row_tolerance: self.row_tolerance,
        }
    }
}

impl CliRegistrationParams {
    fn to_params(&self) -> formgrid::RegistrationParams {
        let mut params = formgrid::RegistrationParams {
            matcher: self.matcher.into(),
            fast_threshold: self.fast_threshold,
            min_matches: self.min_matches,
            ..formgrid::RegistrationParams::default()
        };
        params.ransac.inlier_threshold = self.ransac_thresh_px;
        params.ransac.max_iters = self.ransac_iters;
        params
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grid(args) => run_grid(&args),
        Commands::Align(args) => run_align(&args),
        Commands::Extract(args) => run_extract(&args),
    }
}

fn load_template(path: &Path) -> CliResult<image::RgbImage> {
    tracing::info!("Loading template: {}", path.display());
    Ok(image::open(path)?.to_rgb8())
}

fn run_grid(args: &CliGridArgs) -> CliResult<()> {
    let template = image::open(&args.template)?.to_luma8();
    let grid = formgrid::grid::discover(&template, &args.grid.to_params())?;

    tracing::info!(
        "Discovered {} boxes in {} rows",
        grid.n_boxes(),
        grid.n_rows()
    );

    let json = serde_json::to_string_pretty(&grid)?;
    std::fs::write(&args.out, json)?;
    tracing::info!("Grid written to {}", args.out.display());
    Ok(())
}

#[derive(serde::Serialize)]
struct AlignPageEntry {
    page_index: usize,
    registration: RegistrationReport,
    /// Relative path of the rectified page, absent for skipped pages
    /// and failed writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    /// Write failure for this page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_align(args: &CliAlignArgs) -> CliResult<()> {
    let template = load_template(&args.template)?;
    // Alignment never crops cells, so pin the span to the first box of
    // the first row, which any non-empty grid has.
    let config = PipelineConfig {
        registration: args.registration.to_params(),
        span: CellSpan {
            row: 0,
            start_col: 0,
            count: 1,
        },
        labels: vec!["page".to_string()],
        ..PipelineConfig::default()
    };
    let pipeline = FormPipeline::new(&template, config)?;

    let pages = load_pages(&args.input)?;
    std::fs::create_dir_all(&args.out_dir)?;

    let mut report = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let rectified = pipeline.rectify_page(page);
        // A page that cannot be written still gets its report entry;
        // sibling pages keep going.
        let (image, error) = match &rectified.image {
            Some(img) => {
                let name = format!("page{i:03}.png");
                match img.save(args.out_dir.join(&name)) {
                    Ok(()) => (Some(name), None),
                    Err(err) => {
                        tracing::warn!("Page {i}: write failed: {err}");
                        (None, Some(err.to_string()))
                    }
                }
            }
            None => (None, None),
        };
        if !rectified.registration.aligned {
            tracing::warn!("Page {i}: registration did not converge");
        }
        report.push(AlignPageEntry {
            page_index: i,
            registration: rectified.registration,
            image,
            error,
        });
    }

    let report_path = args.out_dir.join("align.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    tracing::info!("Alignment report written to {}", report_path.display());
    Ok(())
}

#[derive(serde::Serialize)]
struct ExtractCellEntry {
    cell_index: usize,
    label: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

#[derive(serde::Serialize)]
struct ExtractPageEntry {
    page_index: usize,
    registration: RegistrationReport,
    cells: Vec<ExtractCellEntry>,
}

fn run_extract(args: &CliExtractArgs) -> CliResult<()> {
    let template = load_template(&args.template)?;
    let config = PipelineConfig {
        grid: args.grid.to_params(),
        registration: args.registration.to_params(),
        span: CellSpan {
            row: args.row,
            start_col: args.start_col,
            count: args.count,
        },
        labels: args.labels.clone(),
        padding: args.padding,
        mode: args.mode.into(),
        fallback: if args.skip_low_confidence {
            LowConfidenceFallback::SkipPage
        } else {
            LowConfidenceFallback::PassThrough
        },
    };
    let pipeline = FormPipeline::new(&template, config)?;

    let pages = load_pages(&args.input)?;
    tracing::info!("Processing {} page(s)", pages.len());
    let results = pipeline.process_stack(&pages);

    std::fs::create_dir_all(&args.out_dir)?;
    let mut report = Vec::with_capacity(results.len());
    for result in &results {
        report.push(write_page_crops(&args.out_dir, result));
    }

    let aligned = results.iter().filter(|r| r.registration.aligned).count();
    tracing::info!("{aligned}/{} page(s) aligned", results.len());

    let report_path = args.out_dir.join("extract.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    tracing::info!("Extraction report written to {}", report_path.display());
    Ok(())
}

/// Write one page's crops, containing write failures per cell: a cell
/// that cannot be saved is reported in its entry and its siblings still
/// get written.
fn write_page_crops(out_dir: &Path, result: &PageResult) -> ExtractPageEntry {
    let page_dir = out_dir.join(format!("page{:03}", result.page_index));
    if let Err(err) = std::fs::create_dir_all(&page_dir) {
        tracing::warn!("Page {}: cannot create {}: {err}", result.page_index, page_dir.display());
    }

    let mut cells = Vec::with_capacity(result.cells.len());
    for cell in &result.cells {
        let (status, image) = match &cell.outcome {
            CellOutcome::Cropped(img) => {
                let name = format!("page{:03}/{}.png", result.page_index, cell.label);
                match img.save(page_dir.join(format!("{}.png", cell.label))) {
                    Ok(()) => ("cropped".to_string(), Some(name)),
                    Err(err) => {
                        tracing::warn!(
                            "Page {} cell {}: write failed: {err}",
                            result.page_index,
                            cell.label
                        );
                        (format!("write failed: {err}"), None)
                    }
                }
            }
            CellOutcome::Failed(reason) => (reason.to_string(), None),
        };
        cells.push(ExtractCellEntry {
            cell_index: cell.cell_index,
            label: cell.label.clone(),
            status,
            image,
        });
    }

    ExtractPageEntry {
        page_index: result.page_index,
        registration: result.registration.clone(),
        cells,
    }
}
