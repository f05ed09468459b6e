//! Command Line Interface (CLI) arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::frequency::{parse_optional_frequency, Frequency};

/// Ensemble summary command line interface
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct CommandLineArgs {
    /// Root directory of the provider backing store
    #[arg(
        long,
        default_value = "~/.cache/ensemble-summary",
        env = "ENSEMBLE_SUMMARY_STORAGE_ROOT"
    )]
    pub storage_root: String,
    /// Only read providers from the backing store, never build them
    #[arg(long, default_value_t = false, env = "ENSEMBLE_SUMMARY_READ_ONLY")]
    pub read_only: bool,
    /// Number of threads used to parse and resample realizations. Defaults to one less than the
    /// number of CPUs.
    #[arg(long, env = "ENSEMBLE_SUMMARY_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    #[command(subcommand)]
    pub command: Command,
}

impl CommandLineArgs {
    /// Backing store root with `~` expanded.
    pub fn storage_root_path(&self) -> PathBuf {
        expanduser::expanduser(&self.storage_root)
            .unwrap_or_else(|_| PathBuf::from(&self.storage_root))
    }

    /// Size of the rayon thread pool.
    pub fn thread_limit(&self) -> usize {
        self.thread_limit
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}

/// Ensemble summary subcommands
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Build a provider into the backing store and print its storage key
    Build(SourceArgs),
    /// List the vector names of an ensemble
    Vectors {
        #[command(flatten)]
        source: SourceArgs,
        /// Skip vectors where every value is zero
        #[arg(long, default_value_t = false)]
        exclude_all_values_zero: bool,
        /// Skip vectors where every value is the same
        #[arg(long, default_value_t = false)]
        exclude_constant_values: bool,
    },
    /// List the sample dates of an ensemble
    Dates {
        #[command(flatten)]
        source: SourceArgs,
        /// Sampling frequency, `raw` for the raw dates
        #[arg(long, default_value = "raw", value_parser = parse_optional_frequency)]
        frequency: ::std::option::Option<Frequency>,
        /// Comma separated realizations, all if not set
        #[arg(long, value_delimiter = ',')]
        realizations: Option<Vec<i32>>,
    },
}

/// Location of an ensemble's per-realization summary files
#[derive(Clone, Debug, Args)]
pub struct SourceArgs {
    /// Ensemble path pattern, e.g. /scratch/ens/realization-*/iter-0
    pub ens_path: String,
    /// Summary file pattern relative to each realization directory
    #[arg(long, default_value = "share/results/unsmry/*.arrow")]
    pub rel_file_pattern: String,
    /// Presample at this frequency instead of resampling on every query
    #[arg(long)]
    pub presampled: Option<Frequency>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
