//! Construction and caching of ensemble summary providers.
//!
//! A provider is identified by a storage key derived from its construction parameters. The
//! factory looks a key up in its in-process cache, then in the backing store, and only builds
//! the provider from per-realization source files when neither has it.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::arrow_io::{read_summary_file, RealizationSummary};
use crate::backing_store::{storage_key, BackingStore};
use crate::cli::CommandLineArgs;
use crate::error::SummaryError;
use crate::frequency::Frequency;
use crate::metrics::{PROVIDER_BUILDS, PROVIDER_BUILD_TIME};
use crate::providers::{
    lazy, presampled, EnsembleSummaryProvider, ProviderImplArrowLazy, ProviderImplArrowPresampled,
};

lazy_static! {
    static ref REALIZATION_RE: Regex = Regex::new(r"realization-(\d+)").expect("valid regex");
}

/// Factory configuration
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// Root directory of the backing store
    pub storage_root: PathBuf,
    /// Whether missing providers may be built and written to the backing store
    pub allow_storage_writes: bool,
}

impl From<&CommandLineArgs> for FactoryConfig {
    fn from(args: &CommandLineArgs) -> Self {
        FactoryConfig {
            storage_root: args.storage_root_path(),
            allow_storage_writes: !args.read_only,
        }
    }
}

/// A per-realization source file
#[derive(Clone, Debug, PartialEq)]
pub struct RealizationFile {
    pub realization: i32,
    pub path: PathBuf,
}

/// Glob pattern of the per-realization files, without `.` components or trailing separators.
pub fn normalized_file_pattern(ens_path: &str, rel_file_pattern: &str) -> String {
    Path::new(ens_path)
        .join(rel_file_pattern)
        .components()
        .filter(|component| *component != Component::CurDir)
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}

/// Find per-realization files.
///
/// The realization number is taken from the last `realization-<N>` component of each matching
/// path. Paths without one are skipped with a warning, as are further files for a realization
/// that already has one. The result is sorted by realization.
///
/// # Arguments
///
/// * `ens_path`: Ensemble path pattern, e.g. `/scratch/ens/realization-*/iter-0`
/// * `rel_file_pattern`: File pattern relative to each realization directory
pub fn discover_per_realization_files(
    ens_path: &str,
    rel_file_pattern: &str,
) -> Result<Vec<RealizationFile>, SummaryError> {
    let pattern = normalized_file_pattern(ens_path, rel_file_pattern);
    let paths = glob::glob(&pattern).map_err(|source| SummaryError::GlobPattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut files: Vec<RealizationFile> = Vec::new();
    // glob yields paths in alphabetical order.
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %err.path().display(), "unreadable path skipped");
                continue;
            }
        };
        let realization = REALIZATION_RE
            .captures_iter(&path.to_string_lossy())
            .last()
            .and_then(|captures| captures[1].parse::<i32>().ok());
        let Some(realization) = realization else {
            warn!(path = %path.display(), "no realization number in path, file skipped");
            continue;
        };
        if let Some(existing) = files.iter().find(|f| f.realization == realization) {
            warn!(
                realization,
                path = %path.display(),
                kept = %existing.path.display(),
                "more than one file for realization, file skipped"
            );
            continue;
        }
        files.push(RealizationFile { realization, path });
    }
    if files.is_empty() {
        return Err(SummaryError::NoInputFiles { pattern });
    }
    files.sort_by_key(|f| f.realization);
    Ok(files)
}

/// Parse per-realization files in parallel.
fn read_realization_files(
    files: &[RealizationFile],
) -> Result<Vec<RealizationSummary>, SummaryError> {
    files
        .par_iter()
        .map(|file| read_summary_file(&file.path, Some(file.realization)))
        .collect()
}

/// Provider of one storage key, empty until opened or built.
type ProviderSlot = Arc<Mutex<Option<Arc<dyn EnsembleSummaryProvider>>>>;

/// Creates ensemble summary providers, sharing them between callers.
///
/// At most one provider is built per storage key and process. Concurrent requests for a key
/// that is being built wait for that build, requests for other keys do not.
#[derive(Debug)]
pub struct EnsembleSummaryProviderFactory {
    store: BackingStore,
    allow_storage_writes: bool,
    providers: Mutex<HashMap<String, ProviderSlot>>,
}

impl EnsembleSummaryProviderFactory {
    pub fn new(config: FactoryConfig) -> Self {
        info!(
            storage_root = %config.storage_root.display(),
            allow_storage_writes = config.allow_storage_writes,
            "ensemble summary provider factory"
        );
        Self {
            store: BackingStore::new(config.storage_root),
            allow_storage_writes: config.allow_storage_writes,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    /// Storage key of a lazy provider.
    pub fn lazy_storage_key(ens_path: &str, rel_file_pattern: &str) -> String {
        storage_key(&[
            lazy::KIND,
            &normalized_file_pattern(ens_path, rel_file_pattern),
        ])
    }

    /// Storage key of a presampled provider.
    pub fn presampled_storage_key(
        ens_path: &str,
        rel_file_pattern: &str,
        frequency: Frequency,
    ) -> String {
        storage_key(&[
            presampled::KIND,
            &normalized_file_pattern(ens_path, rel_file_pattern),
            &frequency.to_string(),
        ])
    }

    /// Lazy provider over per-realization Arrow summary files.
    ///
    /// # Arguments
    ///
    /// * `ens_path`: Ensemble path pattern, e.g. `/scratch/ens/realization-*/iter-0`
    /// * `rel_file_pattern`: File pattern relative to each realization directory
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn create_from_arrow_unsmry_lazy(
        &self,
        ens_path: &str,
        rel_file_pattern: &str,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, SummaryError> {
        let key = Self::lazy_storage_key(ens_path, rel_file_pattern);
        self.get_or_build(
            lazy::KIND,
            &key,
            |store, key| {
                Ok(ProviderImplArrowLazy::from_backing_store(store, key)?
                    .map(|p| Arc::new(p) as Arc<dyn EnsembleSummaryProvider>))
            },
            |store, key| {
                let files = discover_per_realization_files(ens_path, rel_file_pattern)?;
                let summaries = read_realization_files(&files)?;
                let source_files = files.into_iter().map(|f| f.path).collect();
                ProviderImplArrowLazy::write_backing_store(store, key, &summaries, source_files)
            },
        )
    }

    /// Presampled provider over per-realization Arrow summary files.
    ///
    /// # Arguments
    ///
    /// * `ens_path`: Ensemble path pattern, e.g. `/scratch/ens/realization-*/iter-0`
    /// * `rel_file_pattern`: File pattern relative to each realization directory
    /// * `frequency`: Sampling frequency of the provider
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn create_from_arrow_unsmry_presampled(
        &self,
        ens_path: &str,
        rel_file_pattern: &str,
        frequency: Frequency,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, SummaryError> {
        let key = Self::presampled_storage_key(ens_path, rel_file_pattern, frequency);
        self.get_or_build(
            presampled::KIND,
            &key,
            |store, key| {
                Ok(ProviderImplArrowPresampled::from_backing_store(store, key)?
                    .map(|p| Arc::new(p) as Arc<dyn EnsembleSummaryProvider>))
            },
            |store, key| {
                let files = discover_per_realization_files(ens_path, rel_file_pattern)?;
                let summaries = read_realization_files(&files)?;
                let source_files = files.into_iter().map(|f| f.path).collect();
                ProviderImplArrowPresampled::write_backing_store(
                    store,
                    key,
                    &summaries,
                    frequency,
                    source_files,
                )
            },
        )
    }

    /// The build protocol shared by all provider kinds.
    fn get_or_build<O, B>(
        &self,
        kind: &str,
        storage_key: &str,
        open: O,
        build: B,
    ) -> Result<Arc<dyn EnsembleSummaryProvider>, SummaryError>
    where
        O: Fn(&BackingStore, &str) -> Result<Option<Arc<dyn EnsembleSummaryProvider>>, SummaryError>,
        B: FnOnce(&BackingStore, &str) -> Result<(), SummaryError>,
    {
        // The map lock is only held to find the slot, builds run under the slot lock.
        let slot = self
            .providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(storage_key.to_string())
            .or_default()
            .clone();
        // A panic in another build leaves the slot empty.
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = slot.as_ref() {
            debug!(storage_key, "provider found in process cache");
            return Ok(provider.clone());
        }
        if let Some(provider) = open(&self.store, storage_key)? {
            debug!(storage_key, "provider found in backing store");
            *slot = Some(provider.clone());
            return Ok(provider);
        }
        if !self.allow_storage_writes {
            return Err(SummaryError::StorageWritesDisallowed {
                storage_key: storage_key.to_string(),
            });
        }

        info!(storage_key, kind, "building provider");
        let start = Instant::now();
        build(&self.store, storage_key)?;
        PROVIDER_BUILDS.with_label_values(&[kind]).inc();
        PROVIDER_BUILD_TIME
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());

        let provider =
            open(&self.store, storage_key)?.ok_or_else(|| SummaryError::ProviderNotFoundAfterWrite {
                storage_key: storage_key.to_string(),
            })?;
        *slot = Some(provider.clone());
        Ok(provider)
    }
}
