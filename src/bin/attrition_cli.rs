use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use read_attrition::config::AttritionConfig;
use read_attrition::{
    default_output_path, run_sample, CacheConfig, FingerprintMode, ReferenceCache, SampleInputs,
    StaleRankPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "read-attrition", version, about = "Per-lineage read attrition across a reference mapping step")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cached concatenated reference for a directory of fragments, building it if needed
    Reference {
        /// Directory of reference fragments (`*.fa*`)
        fragments_dir: PathBuf,
        #[arg(long, default_value = ".cache_binned_refs")]
        cache_dir: PathBuf,
        /// Hash file contents instead of name/size/mtime
        #[arg(long)]
        content_hash: bool,
        /// Seconds to wait for another process building the same reference
        #[arg(long, default_value_t = 600)]
        lock_timeout: u64,
    },
    /// Write the attrition table for one sample
    Attrition {
        /// Rank-annotated taxonomy report
        #[arg(long)]
        report: PathBuf,
        /// Per-read classification output
        #[arg(long)]
        classifications: PathBuf,
        /// Reads that mapped to the reference (FASTQ, optionally .gz)
        #[arg(long)]
        mapped: PathBuf,
        /// Reads that did not map (FASTQ, optionally .gz)
        #[arg(long)]
        unmapped: PathBuf,
        /// Output CSV; defaults to <outdir>/<sample>/<sample>_attrition_lineage.csv
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "sample")]
        sample: String,
        #[arg(long, default_value = ".")]
        outdir: PathBuf,
        #[arg(long)]
        classified_only: bool,
        #[arg(long, default_value_t = 5)]
        min_reads: u64,
        #[arg(long, value_enum, default_value_t = StaleRanks::Warn)]
        stale_ranks: StaleRanks,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StaleRanks {
    Ignore,
    Warn,
    Fail,
}

impl From<StaleRanks> for StaleRankPolicy {
    fn from(v: StaleRanks) -> Self {
        match v {
            StaleRanks::Ignore => StaleRankPolicy::Ignore,
            StaleRanks::Warn => StaleRankPolicy::Warn,
            StaleRanks::Fail => StaleRankPolicy::Fail,
        }
    }
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Reference {
            fragments_dir,
            cache_dir,
            content_hash,
            lock_timeout,
        } => {
            let config = CacheConfig {
                fingerprint: if content_hash {
                    FingerprintMode::Content
                } else {
                    FingerprintMode::Metadata
                },
                lock_timeout: Duration::from_secs(lock_timeout),
                ..CacheConfig::new(cache_dir)
            };
            let sp = spinner("blue", "Preparing reference...");
            match ReferenceCache::new(config).build_or_get(&fragments_dir) {
                Ok(path) => {
                    sp.finish_and_clear();
                    println!("{}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    sp.abandon();
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Attrition {
            report,
            classifications,
            mapped,
            unmapped,
            output,
            sample,
            outdir,
            classified_only,
            min_reads,
            stale_ranks,
        } => {
            let inputs = SampleInputs {
                report,
                classifications,
                mapped_reads: mapped,
                unmapped_reads: unmapped,
                output: output.unwrap_or_else(|| default_output_path(&outdir, &sample)),
            };
            let config = AttritionConfig {
                classified_only,
                min_reads,
                stale_ranks: stale_ranks.into(),
            };

            log::info!("processing {sample}");
            let sp = spinner("green", "Aggregating reads...");
            match run_sample(&inputs, &config) {
                Ok(summary) => {
                    sp.finish_with_message(format!(
                        "{} lineage(s) written to {}",
                        summary.rows.len(),
                        summary.output.display()
                    ));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    sp.abandon();
                    log::error!("{sample}: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
