mod output;
mod progress;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use commons_stats_core::aggregate::{Aggregate, OutputType, timeseries_rows};
use commons_stats_core::captions::{CaptionOptions, CaptionRecord, collect_captions};
use commons_stats_core::client::{HttpFetch, RemoteClient};
use commons_stats_core::config::{DEFAULT_CONFIG_FILENAME, StatsConfig, load_config};
use commons_stats_core::creation::count_file_creations;
use commons_stats_core::dates::{ApiDate, DateWindow};
use commons_stats_core::derivatives::find_derivatives;
use commons_stats_core::diffstats::{DiffStats, analyse_diffs};
use commons_stats_core::mediaviews::{
    MediaRequestFetcher, MediaViewsOptions, MediaViewsOutcome, collect_media_views,
};
use commons_stats_core::stats::RunStatistics;
use commons_stats_core::walker::WalkOptions;
use commons_stats_core::wiki::{CategoryRef, MediaWikiClient};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::output::{
    RunMeta, clean_category_name, normalize_path, read_diff, read_time_series,
    render_file_count_tsv, render_time_series_tsv, write_json, write_text,
};
use crate::progress::BarProgress;

#[derive(Debug, Parser)]
#[command(
    name = "commons-stats",
    version,
    about = "Usage and engagement statistics for the files of a Wikimedia Commons category"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short = 'd', long, global = true, help = "Log per-request diagnostics")]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Media request counts of the category's files
    Mediaviews(MediaViewsArgs),
    /// Captions of the category's files on every wiki that embeds them
    Captions(CaptionArgs),
    /// Convert a per-time-unit mediaviews output to TSV
    #[command(name = "timeseries-tsv")]
    TimeseriesTsv(TimeseriesArgs),
    /// Count the category's files by month of upload
    #[command(name = "file-count")]
    FileCount(CategoryArgs),
    /// List File-namespace pages linking to the category's files
    Derivatives(CategoryArgs),
    /// Summarize a structured-data diff output
    #[command(name = "diff-stats")]
    DiffStats(DiffStatsArgs),
}

#[derive(Debug, Args)]
struct WalkArgs {
    #[arg(
        short = 'r',
        long,
        value_name = "N",
        allow_negative_numbers = true,
        help = "Levels of subcategories to descend"
    )]
    depth: Option<i32>,
    #[arg(short = 'l', long, value_name = "N", help = "Stop after N distinct files")]
    limit: Option<usize>,
}

impl WalkArgs {
    fn options(&self) -> WalkOptions {
        WalkOptions {
            depth: self.depth,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Args)]
struct MediaViewsArgs {
    #[arg(short = 'c', long, value_name = "NAME")]
    category: String,
    #[arg(short = 's', long, value_name = "YYYYMMDD")]
    start: String,
    #[arg(short = 'e', long, value_name = "YYYYMMDD[HH]", help = "Exclusive end, defaults to today")]
    end: Option<String>,
    #[command(flatten)]
    walk: WalkArgs,
    #[arg(short = 't', long = "type", value_name = "raw|file|month|day", default_value = "file")]
    output_type: String,
    #[arg(short = 'o', long, value_name = "PATH", default_value = "stats_output.json")]
    output: PathBuf,
    #[arg(short = 'u', long, value_name = "USER", help = "Contact identity sent with requests")]
    user: Option<String>,
}

#[derive(Debug, Args)]
struct CaptionArgs {
    #[arg(short = 'c', long, value_name = "NAME")]
    category: String,
    #[arg(long, help = "Skip the slower <gallery> caption lookup")]
    no_gallery: bool,
    #[arg(long, help = "Record files without a caption")]
    keep_empty: bool,
    #[command(flatten)]
    walk: WalkArgs,
    #[arg(short = 'o', long, value_name = "PATH", default_value = "caption_output.json")]
    output: PathBuf,
    #[arg(short = 'u', long, value_name = "USER", help = "Contact identity sent with requests")]
    user: Option<String>,
}

#[derive(Debug, Args)]
struct TimeseriesArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    #[arg(short = 'o', long, value_name = "PATH", help = "Defaults to INPUT with a .tsv extension")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DiffStatsArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    #[arg(short = 'o', long, value_name = "PATH", help = "Defaults to INPUT_stats.json")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CategoryArgs {
    #[arg(short = 'c', long, value_name = "NAME")]
    category: String,
    #[command(flatten)]
    walk: WalkArgs,
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(short = 'u', long, value_name = "USER", help = "Contact identity sent with requests")]
    user: Option<String>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct MediaViewsParams {
    category: String,
    start: ApiDate,
    end: ApiDate,
    depth: Option<i32>,
    limit: Option<usize>,
    output_type: OutputType,
}

#[derive(Debug, Serialize)]
struct MediaViewsDocument<'a> {
    meta: RunMeta<MediaViewsParams>,
    data: &'a Aggregate,
}

#[derive(Debug, Serialize)]
struct CaptionParams {
    category: String,
    depth: Option<i32>,
    limit: Option<usize>,
    gallery: bool,
    keep_empty: bool,
}

#[derive(Debug, Serialize)]
struct CaptionDocument<'a> {
    meta: RunMeta<CaptionParams>,
    stats: RunStatistics,
    results: &'a BTreeMap<String, Vec<CaptionRecord>>,
}

#[derive(Debug, Serialize)]
struct CategoryParams {
    category: String,
    depth: Option<i32>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DiffStatsDocument<'a> {
    meta: &'a serde_json::Value,
    stats: DiffStats,
}

#[derive(Debug, Serialize)]
struct DerivativeDocument<'a> {
    meta: RunMeta<CategoryParams>,
    relations: usize,
    links: &'a BTreeMap<String, Vec<String>>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);
    let runtime = RuntimeOptions {
        config: cli.config.clone(),
    };

    match cli.command {
        Commands::Mediaviews(args) => run_mediaviews(&runtime, args),
        Commands::Captions(args) => run_captions(&runtime, args),
        Commands::TimeseriesTsv(args) => run_timeseries_tsv(args),
        Commands::FileCount(args) => run_file_count(&runtime, args),
        Commands::Derivatives(args) => run_derivatives(&runtime, args),
        Commands::DiffStats(args) => run_diff_stats(args),
    }
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run_mediaviews(runtime: &RuntimeOptions, args: MediaViewsArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let start = ApiDate::parse(&args.start)?;
    let end = match args.end.as_deref() {
        Some(end) => ApiDate::parse(end)?,
        None => ApiDate::today(),
    };
    let window = DateWindow::new(start, end)?;
    let output_type = OutputType::parse(&args.output_type)?;

    let settings = config.client_settings(args.user.as_deref())?;
    let mut wiki = MediaWikiClient::new(
        &config.commons_api_url(),
        RemoteClient::new(settings.clone())?,
    );
    let mut rest = RemoteClient::new(settings)?;
    let fetcher = MediaRequestFetcher::new(&config.metrics_api_url());

    let category = CategoryRef::new(&args.category);
    let options = MediaViewsOptions {
        category: category.clone(),
        walk: args.walk.options(),
        window,
        output: output_type,
    };
    let mut progress = BarProgress::new("files");
    let outcome = collect_media_views(&mut wiki, &mut rest, &fetcher, &options, &mut progress)?;

    match outcome {
        MediaViewsOutcome::NoResults { files_examined } => {
            println!("Found no stats for the category.");
            println!("files_examined: {files_examined}");
        }
        MediaViewsOutcome::Stats(report) => {
            println!("Found stats for {} files.", report.files_with_stats);
            println!("files_examined: {}", report.files_examined);
            let document = MediaViewsDocument {
                meta: RunMeta::new(MediaViewsParams {
                    category: category.title().to_string(),
                    start,
                    end,
                    depth: options.walk.depth,
                    limit: options.walk.limit,
                    output_type,
                }),
                data: &report.result,
            };
            write_json(&args.output, &document)?;
            println!("Data saved to {}", normalize_path(&args.output));
        }
    }
    println!("requests: {}", wiki.request_count() + rest.request_count());
    Ok(())
}

fn run_captions(runtime: &RuntimeOptions, args: CaptionArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let settings = config.client_settings(args.user.as_deref())?;
    let mut wiki = MediaWikiClient::new(
        &config.commons_api_url(),
        RemoteClient::new(settings.clone())?,
    );
    let mut rest = RemoteClient::new(settings)?;

    let category = CategoryRef::new(&args.category);
    let options = CaptionOptions {
        category: category.clone(),
        walk: args.walk.options(),
        gallery: !args.no_gallery,
        keep_empty: args.keep_empty,
    };
    let mut progress = BarProgress::new("files");
    let report = collect_captions(&mut wiki, &mut rest, &options, &mut progress)?;

    println!(
        "Found {} files used {} times across {} pages on {} sites.",
        report.stats.used_files, report.stats.usages, report.stats.pages, report.stats.sites
    );
    for unsupported in &report.unsupported {
        println!(
            "unsupported: {} ({})",
            unsupported.site,
            unsupported.endpoint.as_str()
        );
    }
    if report.results.is_empty() {
        println!("Found no captions for the category.");
        return Ok(());
    }

    println!("Found captions for {} files.", report.results.len());
    let document = CaptionDocument {
        meta: RunMeta::new(CaptionParams {
            category: category.title().to_string(),
            depth: options.walk.depth,
            limit: options.walk.limit,
            gallery: options.gallery,
            keep_empty: options.keep_empty,
        }),
        stats: report.stats,
        results: &report.results,
    };
    write_json(&args.output, &document)?;
    println!("Data saved to {}", normalize_path(&args.output));
    Ok(())
}

fn run_timeseries_tsv(args: TimeseriesArgs) -> Result<()> {
    let series = read_time_series(&args.input)?;
    if series.is_empty() {
        bail!("{} contains no time series", normalize_path(&args.input));
    }
    let rows = timeseries_rows(&series);
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("tsv"));
    write_text(&output, &render_time_series_tsv(&rows))?;
    println!("rows: {}", rows.len());
    println!("Data saved to {}", normalize_path(&output));
    Ok(())
}

fn run_file_count(runtime: &RuntimeOptions, args: CategoryArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let settings = config.client_settings(args.user.as_deref())?;
    let mut wiki = MediaWikiClient::new(&config.commons_api_url(), RemoteClient::new(settings)?);

    let category = CategoryRef::new(&args.category);
    let mut progress = BarProgress::new("files");
    let counts = count_file_creations(&mut wiki, &category, &args.walk.options(), &mut progress)?;

    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!("{}_file_count.tsv", clean_category_name(&category)))
    });
    println!("files: {}", counts.values().sum::<usize>());
    println!("months: {}", counts.len());
    write_text(&output, &render_file_count_tsv(&category, &counts))?;
    println!("Data saved to {}", normalize_path(&output));
    Ok(())
}

fn run_derivatives(runtime: &RuntimeOptions, args: CategoryArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let settings = config.client_settings(args.user.as_deref())?;
    let mut wiki = MediaWikiClient::new(&config.commons_api_url(), RemoteClient::new(settings)?);

    let category = CategoryRef::new(&args.category);
    let walk = args.walk.options();
    let mut progress = BarProgress::new("files");
    let report = find_derivatives(&mut wiki, &category, &walk, &mut progress)?;

    println!("linked_files: {}", report.links.len());
    println!("relations: {}", report.relations);
    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!("{}_backlinks.json", clean_category_name(&category)))
    });
    let document = DerivativeDocument {
        meta: RunMeta::new(CategoryParams {
            category: category.title().to_string(),
            depth: walk.depth,
            limit: walk.limit,
        }),
        relations: report.relations,
        links: &report.links,
    };
    write_json(&output, &document)?;
    println!("Data saved to {}", normalize_path(&output));
    Ok(())
}

fn run_diff_stats(args: DiffStatsArgs) -> Result<()> {
    let diff = read_diff(&args.input)?;
    let stats = analyse_diffs(&diff.results);
    println!("files: {}", stats.all);
    println!("changed: {}", stats.changed);
    println!("caption_languages: {}", stats.caption_languages);

    let output = args.output.unwrap_or_else(|| {
        let stem = args
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "diff".to_string());
        args.input.with_file_name(format!("{stem}_stats.json"))
    });
    write_json(
        &output,
        &DiffStatsDocument {
            meta: &diff.meta,
            stats,
        },
    )?;
    println!("Data saved to {}", normalize_path(&output));
    Ok(())
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<StatsConfig> {
    let path = runtime
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    ensure_explicit_config_exists(runtime, &path)?;
    Ok(load_config(&path)?)
}

fn ensure_explicit_config_exists(runtime: &RuntimeOptions, path: &Path) -> Result<()> {
    if runtime.config.is_some() && !path.exists() {
        bail!("config file not found: {}", normalize_path(path));
    }
    Ok(())
}
