use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use gaitscope::analysis::grouped::grouped_statistics;
use gaitscope::config::{PipelineConfig, RotationMethod};
use gaitscope::data::loader::load_file;
use gaitscope::data::pivot::pivot_metrics;
use gaitscope::state::{normalise_and_suggest, Pipeline};

#[derive(Parser)]
#[command(name = "gaitscope")]
#[command(about = "Grouped statistics and PCA variable importance for gait measurements")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mean and sample stdev per variable, timepoint and condition
    Stats {
        /// Input table (.csv, .json, .parquet)
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rank variables by weighted PCA loadings
    Importance {
        file: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Explained variance, loadings and scores of the fitted PCA
    Diagnostics {
        file: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Reshape to one entry per metric and task condition
    Pivot {
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Grouped statistics plus best-effort importance suggestions
    Normalise {
        file: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

/// Overrides applied on top of the defaults or `--config`.
#[derive(Args)]
struct AnalysisArgs {
    /// JSON file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cumulative explained variance to retain (0, 1]
    #[arg(long)]
    variance_threshold: Option<f64>,

    /// Expected fraction of outlier rows [0, 0.5)
    #[arg(long)]
    contamination: Option<f64>,

    /// Loadings rotation: none, varimax or promax
    #[arg(long)]
    rotation: Option<RotationMethod>,

    /// Minimum absolute loading counted toward importance
    #[arg(long)]
    min_significance: Option<f64>,

    /// Seed for the outlier filter
    #[arg(long)]
    seed: Option<u64>,

    /// Fewest components the decomposition must retain
    #[arg(long)]
    min_components: Option<usize>,

    /// Number of ranked variables to report
    #[arg(long)]
    top: Option<usize>,
}

impl AnalysisArgs {
    fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.variance_threshold {
            config.variance_threshold = v;
        }
        if let Some(v) = self.contamination {
            config.contamination = v;
        }
        if let Some(v) = self.rotation {
            config.rotation_method = v;
        }
        if let Some(v) = self.min_significance {
            config.min_significance = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.min_components {
            config.min_components = v;
        }
        if let Some(v) = self.top {
            config.top_n = v;
        }
        Ok(config)
    }

    fn pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::new(self.to_config()?)?)
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl OutputArgs {
    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Wrote {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn load(path: &Path) -> Result<gaitscope::data::model::RawTable> {
    let table = load_file(path).with_context(|| format!("loading {}", path.display()))?;
    info!(
        "Loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.n_columns(),
        path.display()
    );
    Ok(table)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stats { file, output } => {
            let stats = grouped_statistics(&load(&file)?)?;
            output.emit(&stats)
        }
        Commands::Importance {
            file,
            analysis,
            output,
        } => {
            let report = analysis.pipeline()?.run(&load(&file)?)?;
            output.emit(&report.ranking)
        }
        Commands::Diagnostics {
            file,
            analysis,
            output,
        } => {
            let report = analysis.pipeline()?.run(&load(&file)?)?;
            output.emit(&report)
        }
        Commands::Pivot { file, output } => {
            let entries = pivot_metrics(&load(&file)?)?;
            output.emit(&entries)
        }
        Commands::Normalise {
            file,
            analysis,
            output,
        } => {
            let combined = normalise_and_suggest(&load(&file)?, &analysis.pipeline()?)?;
            output.emit(&combined)
        }
    }
}
