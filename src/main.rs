//! This file defines the ensemble-summary binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use ensemble_summary::cli::{self, Command, CommandLineArgs, SourceArgs};
use ensemble_summary::error::{ErrorReport, SummaryError};
use ensemble_summary::factory::{EnsembleSummaryProviderFactory, FactoryConfig};
use ensemble_summary::metrics;
use ensemble_summary::providers::EnsembleSummaryProvider;
use ensemble_summary::tracing;

/// Open or build the provider for a source, returning its storage key too.
fn provider(
    factory: &EnsembleSummaryProviderFactory,
    source: &SourceArgs,
) -> Result<(String, Arc<dyn EnsembleSummaryProvider>), SummaryError> {
    match source.presampled {
        Some(frequency) => Ok((
            EnsembleSummaryProviderFactory::presampled_storage_key(
                &source.ens_path,
                &source.rel_file_pattern,
                frequency,
            ),
            factory.create_from_arrow_unsmry_presampled(
                &source.ens_path,
                &source.rel_file_pattern,
                frequency,
            )?,
        )),
        None => Ok((
            EnsembleSummaryProviderFactory::lazy_storage_key(
                &source.ens_path,
                &source.rel_file_pattern,
            ),
            factory.create_from_arrow_unsmry_lazy(&source.ens_path, &source.rel_file_pattern)?,
        )),
    }
}

fn run(args: &CommandLineArgs) -> Result<(), SummaryError> {
    let factory = EnsembleSummaryProviderFactory::new(FactoryConfig::from(args));
    match &args.command {
        Command::Build(source) => {
            let (storage_key, provider) = provider(&factory, source)?;
            ::tracing::info!(
                storage_key = storage_key.as_str(),
                realizations = provider.realizations().len(),
                vectors = provider.vector_names().len(),
                "provider ready"
            );
            println!("{}", storage_key);
        }
        Command::Vectors {
            source,
            exclude_all_values_zero,
            exclude_constant_values,
        } => {
            let (_, provider) = provider(&factory, source)?;
            let names = if *exclude_all_values_zero || *exclude_constant_values {
                provider
                    .vector_names_filtered_by_value(*exclude_all_values_zero, *exclude_constant_values)?
            } else {
                provider.vector_names()
            };
            for name in names {
                println!("{}", name);
            }
        }
        Command::Dates {
            source,
            frequency,
            realizations,
        } => {
            let (_, provider) = provider(&factory, source)?;
            for date in provider.dates(*frequency, realizations.as_deref())? {
                println!("{}", date.format("%Y-%m-%d"));
            }
        }
    }
    Ok(())
}

/// Application entry point
fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(err) = metrics::register_metrics() {
        ::tracing::warn!("failed to register metrics: {}", err);
    }
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(args.thread_limit())
        .build_global()
    {
        ::tracing::warn!("failed to configure thread pool: {}", err);
    }

    match run(&args) {
        Ok(()) => {
            ::tracing::debug!("{}", metrics::gather_metrics());
            ExitCode::SUCCESS
        }
        Err(err) => {
            let report = ErrorReport::from(&err);
            match serde_json::to_string(&report) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", report.message),
            }
            ExitCode::FAILURE
        }
    }
}
