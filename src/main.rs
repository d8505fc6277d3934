//! # chartscan
//!
//! Command-line front end: analyze one instrument, scan many CSV files in
//! parallel, or list matcher parameters.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chartscan::{
    config::{AnalysisConfig, ParamOverride},
    data::{self, DataOrigin},
    logging::{init_logging, LogConfig},
    params::{param_meta_for, ParamType},
    prelude::*,
    report::default_run_id,
};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chartscan")]
#[command(about = "Chart pattern detection and signal voting over OHLCV data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every matcher and the signal voter on one instrument
    Analyze {
        /// OHLCV CSV file; synthetic data is used when missing or unreadable
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Ticker label for the report and artifact names
        #[arg(short, long)]
        ticker: Option<String>,

        /// Length of the synthetic series
        #[arg(long, default_value = "300")]
        bars: usize,

        /// Seed of the synthetic series
        #[arg(long, default_value = "42")]
        seed: u64,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for chart artifacts and the report file
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Run identifier (default: current UTC time)
        #[arg(long)]
        run_id: Option<String>,

        /// Override one matcher threshold, e.g. `double_top.threshold=0.03` (repeatable)
        #[arg(long = "param", value_name = "PATTERN.NAME=VALUE")]
        params: Vec<ParamOverride>,

        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },

    /// Analyze several CSV files in parallel and print a summary table
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List tunable parameters of one or all patterns
    Params {
        /// Pattern name, e.g. DOUBLE_TOP or "cup and handle"
        pattern: Option<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::load(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze(
    csv: Option<PathBuf>,
    ticker: Option<String>,
    bars: usize,
    seed: u64,
    config: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    run_id: Option<String>,
    overrides: Vec<ParamOverride>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref())?;
    config
        .apply_overrides(&overrides)
        .context("invalid --param override")?;
    if let Some(t) = ticker {
        config.run.ticker = t;
    }
    if run_id.is_some() {
        config.run.run_id = run_id;
    }
    let run_id = config.run.run_id.clone().unwrap_or_else(default_run_id);

    let (table, origin) = data::load_or_synthetic(csv.as_deref(), seed, bars);
    let series = Series::from_columns(&table).context("input does not form a valid series")?;
    if let DataOrigin::Synthetic { seed } = origin {
        tracing::info!(seed, bars = series.len(), "using synthetic data");
    }
    if let Some(s) = series.summary() {
        tracing::info!(
            bars = s.count,
            mean = s.mean,
            std = s.std,
            min = s.min,
            max = s.max,
            "series summary"
        );
    }

    let engine = EngineBuilder::from_config(&config)?.build()?;
    let analysis = engine.analyze(&series);

    let writer = out_dir.clone().map(JsonArtifactWriter::new);
    let renderer = writer.as_ref().map(|w| w as &dyn ChartRenderer);
    let report = AnalysisReport::new(
        &config.run.ticker,
        &config.run.interval,
        &run_id,
        &series,
        &analysis,
        renderer,
    );

    let (body, ext) = match format {
        OutputFormat::Markdown => (report.to_markdown(), "md"),
        OutputFormat::Json => (report.to_json()?, "json"),
    };
    println!("{body}");

    if let Some(dir) = out_dir {
        let path = report
            .write_to(&dir, ext, &body)
            .with_context(|| format!("failed to write report into {}", dir.display()))?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn batch(files: Vec<PathBuf>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    let engine = EngineBuilder::from_config(&config)?.build()?;

    let mut tables = Vec::with_capacity(files.len());
    for path in &files {
        let symbol = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match data::load_csv(path) {
            Ok(table) => tables.push((symbol, table)),
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "skipping file"),
        }
    }
    if tables.is_empty() {
        bail!("none of the {} input files could be loaded", files.len());
    }

    let inputs: Vec<(&str, &RawTable)> = tables.iter().map(|(s, t)| (s.as_str(), t)).collect();
    let (mut results, errors) = scan_parallel(&engine, inputs);
    results.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    println!("| Symbol | Bars | Patterns | Signal | Confidence |");
    println!("|---|---:|---|---|---:|");
    for r in &results {
        let found: Vec<String> = r
            .analysis
            .found()
            .map(|c| format!("{} ({:?})", c.kind().name(), c.status))
            .collect();
        let patterns = if found.is_empty() {
            "-".to_string()
        } else {
            found.join(", ")
        };
        println!(
            "| {} | {} | {} | {} | {:.0}% |",
            r.symbol,
            r.analysis.bars,
            patterns,
            r.analysis.signal.direction(),
            r.analysis.signal.confidence()
        );
    }
    for e in &errors {
        println!("| {} | - | error: {} | - | - |", e.symbol, e.error);
    }
    Ok(())
}

fn params(pattern: Option<String>) -> anyhow::Result<()> {
    let kinds = match pattern {
        Some(p) => vec![p.parse::<PatternKind>()?],
        None => PatternKind::ALL.to_vec(),
    };
    for kind in kinds {
        println!("{} ({})", kind.name(), kind);
        for meta in param_meta_for(kind) {
            let ty = match meta.param_type {
                ParamType::Ratio => "ratio",
                ParamType::Period => "period",
            };
            let (min, max, step) = meta.range;
            println!(
                "  {:<20} {:<6} default {:<8} range {min}..={max} step {step} ({} values)  {}",
                meta.name,
                ty,
                meta.default,
                meta.generate_grid().len(),
                meta.description
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            csv,
            ticker,
            bars,
            seed,
            config,
            out_dir,
            run_id,
            params,
            format,
        } => analyze(csv, ticker, bars, seed, config, out_dir, run_id, params, format),
        Commands::Batch { files, config } => batch(files, config),
        Commands::Params { pattern } => params(pattern),
    }
}
