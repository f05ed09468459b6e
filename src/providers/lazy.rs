//! Provider holding raw data and resampling on every query.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::arrow_io::RealizationSummary;
use crate::backing_store::{BackingStore, Manifest};
use crate::error::SummaryError;
use crate::frequency::{generate_normalized_sample_dates, Frequency};
use crate::providers::{
    check_vector_names, combine_realizations, filter_vector_names_by_value, rate_flags,
    EnsembleSummaryProvider, VectorMetadata,
};
use crate::resampling::{resample_table, sample_at_date};
use crate::table::TimeSeriesTable;

/// Backing store kind of lazy providers
pub const KIND: &str = "arrow_unsmry_lazy";

/// Lazy provider over raw per-realization data
#[derive(Debug)]
pub struct ProviderImplArrowLazy {
    table: TimeSeriesTable,
    metadata: HashMap<String, VectorMetadata>,
}

impl ProviderImplArrowLazy {
    /// Returns a new lazy provider.
    ///
    /// The table is sorted by `(REAL, DATE)` and validated.
    pub fn new(
        table: TimeSeriesTable,
        metadata: HashMap<String, VectorMetadata>,
    ) -> Result<Self, SummaryError> {
        let table = table.sorted_by_real_and_date();
        table.validate()?;
        Ok(Self { table, metadata })
    }

    /// Open a provider from the backing store, `None` if the entry does not exist.
    pub fn from_backing_store(
        store: &BackingStore,
        storage_key: &str,
    ) -> Result<Option<Self>, SummaryError> {
        match store.read(KIND, storage_key)? {
            Some(entry) => Ok(Some(Self::new(entry.table, entry.metadata)?)),
            None => Ok(None),
        }
    }

    /// Write raw per-realization data to the backing store.
    ///
    /// # Arguments
    ///
    /// * `store`: Backing store
    /// * `storage_key`: Entry key
    /// * `summaries`: Parsed per-realization data
    /// * `source_files`: Files the summaries were read from, recorded in the manifest
    pub fn write_backing_store(
        store: &BackingStore,
        storage_key: &str,
        summaries: &[RealizationSummary],
        source_files: Vec<PathBuf>,
    ) -> Result<(), SummaryError> {
        let (table, metadata) = combine_realizations(summaries);
        let manifest = Manifest::new(KIND, storage_key, None, &table, source_files);
        store.write(KIND, storage_key, &table, &metadata, &manifest)
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

impl EnsembleSummaryProvider for ProviderImplArrowLazy {
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
        true
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<Vec<NaiveDateTime>, SummaryError> {
        let table = self.table.filter_realizations(realizations);
        Ok(match (frequency, table.date_range()) {
            (None, _) => table.unique_dates(),
            (Some(frequency), Some((min_date, max_date))) => {
                generate_normalized_sample_dates(min_date, max_date, frequency)
            }
            (Some(_), None) => vec![],
        })
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    fn get_vectors_df(
        &self,
        vector_names: &[String],
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        let table = self.selection(vector_names, realizations)?;
        match frequency {
            None => Ok(table),
            Some(frequency) => {
                resample_table(&table, frequency, &rate_flags(&self.metadata, vector_names))
            }
        }
    }

    fn get_vectors_for_date_df(
        &self,
        date: NaiveDateTime,
        vector_names: &[String],
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        let table = self.selection(vector_names, realizations)?;
        sample_at_date(&table, date, &rate_flags(&self.metadata, vector_names))
    }
}
