//! Provider holding data resampled once at build time.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::arrow_io::RealizationSummary;
use crate::backing_store::{BackingStore, Manifest};
use crate::error::SummaryError;
use crate::frequency::Frequency;
use crate::providers::{
    check_vector_names, combine_realizations, filter_vector_names_by_value, rate_flags,
    EnsembleSummaryProvider, VectorMetadata,
};
use crate::resampling::resample_table;
use crate::table::TimeSeriesTable;

/// Backing store kind of presampled providers
pub const KIND: &str = "arrow_unsmry_presampled";

/// Provider over data sampled at a single fixed frequency.
///
/// Queries at any other frequency fail with [SummaryError::ResamplingNotSupported].
#[derive(Debug)]
pub struct ProviderImplArrowPresampled {
    table: TimeSeriesTable,
    metadata: HashMap<String, VectorMetadata>,
    frequency: Frequency,
}

impl ProviderImplArrowPresampled {
    /// Returns a new presampled provider over an already resampled table.
    pub fn new(
        table: TimeSeriesTable,
        metadata: HashMap<String, VectorMetadata>,
        frequency: Frequency,
    ) -> Result<Self, SummaryError> {
        let table = table.sorted_by_real_and_date();
        table.validate()?;
        Ok(Self {
            table,
            metadata,
            frequency,
        })
    }

    /// Open a provider from the backing store, `None` if the entry does not exist.
    ///
    /// The frequency comes from the entry manifest.
    pub fn from_backing_store(
        store: &BackingStore,
        storage_key: &str,
    ) -> Result<Option<Self>, SummaryError> {
        let Some(entry) = store.read(KIND, storage_key)? else {
            return Ok(None);
        };
        let frequency = entry.manifest.frequency.ok_or_else(|| SummaryError::InvalidTable {
            reason: format!("presampled entry {} has no frequency", storage_key),
        })?;
        Ok(Some(Self::new(entry.table, entry.metadata, frequency)?))
    }

    /// Resample raw per-realization data and write it to the backing store.
    ///
    /// # Arguments
    ///
    /// * `store`: Backing store
    /// * `storage_key`: Entry key
    /// * `summaries`: Parsed per-realization data
    /// * `frequency`: Sampling frequency of the stored data
    /// * `source_files`: Files the summaries were read from, recorded in the manifest
    pub fn write_backing_store(
        store: &BackingStore,
        storage_key: &str,
        summaries: &[RealizationSummary],
        frequency: Frequency,
        source_files: Vec<PathBuf>,
    ) -> Result<(), SummaryError> {
        let (raw, metadata) = combine_realizations(summaries);
        let flags = rate_flags(&metadata, raw.vector_names());
        let table = resample_table(&raw, frequency, &flags)?;
        let manifest = Manifest::new(KIND, storage_key, Some(frequency), &table, source_files);
        store.write(KIND, storage_key, &table, &metadata, &manifest)
    }

    /// Sampling frequency of this provider.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    fn check_frequency(&self, frequency: Option<Frequency>) -> Result<(), SummaryError> {
        match frequency {
            None => Ok(()),
            Some(requested) if requested == self.frequency => Ok(()),
            Some(requested) => Err(SummaryError::ResamplingNotSupported {
                requested,
                available: self.frequency.to_string(),
            }),
        }
    }

    fn selection(
        &self,
        vector_names: &[String],
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        check_vector_names(self.table.vector_names(), vector_names)?;
        self.table
            .filter_realizations(realizations)
            .select_vectors(vector_names)
    }
}

impl EnsembleSummaryProvider for ProviderImplArrowPresampled {
    fn vector_names(&self) -> Vec<String> {
        self.table.vector_names().to_vec()
    }

    fn vector_names_filtered_by_value(
        &self,
        exclude_all_values_zero: bool,
        exclude_constant_values: bool,
    ) -> Result<Vec<String>, SummaryError> {
        Ok(filter_vector_names_by_value(
            &self.table,
            exclude_all_values_zero,
            exclude_constant_values,
        ))
    }

    fn realizations(&self) -> Vec<i32> {
        self.table.realizations()
    }

    fn vector_metadata(&self, vector_name: &str) -> Result<Option<VectorMetadata>, SummaryError> {
        Ok(self.metadata.get(vector_name).cloned())
    }

    fn supports_resampling(&self) -> bool {
        false
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<Vec<NaiveDateTime>, SummaryError> {
        self.check_frequency(frequency)?;
        Ok(self.table.filter_realizations(realizations).unique_dates())
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    fn get_vectors_df(
        &self,
        vector_names: &[String],
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        self.check_frequency(frequency)?;
        self.selection(vector_names, realizations)
    }

    fn get_vectors_for_date_df(
        &self,
        date: NaiveDateTime,
        vector_names: &[String],
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        Ok(self
            .selection(vector_names, realizations)?
            .filter_rows(|row_date, _| row_date == date))
    }
}
