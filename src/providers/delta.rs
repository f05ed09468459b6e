//! Provider presenting the difference between two ensembles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use ndarray::Array2;

use crate::error::SummaryError;
use crate::frequency::Frequency;
use crate::providers::{
    check_vector_names, filter_vector_names_by_value, EnsembleSummaryProvider, VectorMetadata,
};
use crate::table::TimeSeriesTable;

/// Provider of `A - B` for two providers `A` and `B`.
///
/// Vector names, realizations and dates are the intersections of those of `A` and `B`. Values
/// are matched on `(REAL, DATE)`; rows present in only one provider, and rows where the
/// difference is `NaN`, are dropped.
#[derive(Debug)]
pub struct DeltaEnsembleProvider {
    provider_a: Arc<dyn EnsembleSummaryProvider>,
    provider_b: Arc<dyn EnsembleSummaryProvider>,
}

impl DeltaEnsembleProvider {
    /// Returns a new delta provider.
    ///
    /// Fails with [SummaryError::DeltaResamplingMismatch] unless both providers agree on
    /// [EnsembleSummaryProvider::supports_resampling].
    pub fn new(
        provider_a: Arc<dyn EnsembleSummaryProvider>,
        provider_b: Arc<dyn EnsembleSummaryProvider>,
    ) -> Result<Self, SummaryError> {
        if provider_a.supports_resampling() != provider_b.supports_resampling() {
            return Err(SummaryError::DeltaResamplingMismatch);
        }
        Ok(Self {
            provider_a,
            provider_b,
        })
    }

    /// Requested realizations restricted to those both providers have.
    fn common_realizations(&self, realizations: Option<&[i32]>) -> Vec<i32> {
        let common = self.realizations();
        match realizations {
            None => common,
            Some(requested) => common
                .into_iter()
                .filter(|real| requested.contains(real))
                .collect(),
        }
    }
}

/// `a - b` for rows matching on `(REAL, DATE)`, rows containing `NaN` dropped.
fn subtract_aligned(
    a: &TimeSeriesTable,
    b: &TimeSeriesTable,
) -> Result<TimeSeriesTable, SummaryError> {
    let b_rows: HashMap<(i32, NaiveDateTime), usize> = b
        .reals()
        .iter()
        .zip(b.dates())
        .enumerate()
        .map(|(row, (real, date))| ((*real, *date), row))
        .collect();

    let mut dates = Vec::new();
    let mut reals = Vec::new();
    let mut rows = Vec::new();
    for (row_a, (real, date)) in a.reals().iter().zip(a.dates()).enumerate() {
        let Some(&row_b) = b_rows.get(&(*real, *date)) else {
            continue;
        };
        let diff = &a.values().row(row_a) - &b.values().row(row_b);
        if diff.iter().any(|v| v.is_nan()) {
            continue;
        }
        dates.push(*date);
        reals.push(*real);
        rows.extend(diff.iter().copied());
    }

    let values = Array2::from_shape_vec((dates.len(), a.vector_names().len()), rows).map_err(
        |err| SummaryError::InvalidTable {
            reason: err.to_string(),
        },
    )?;
    Ok(TimeSeriesTable::new(dates, reals, a.vector_names().to_vec(), values)?
        .sorted_by_real_and_date())
}

impl EnsembleSummaryProvider for DeltaEnsembleProvider {
    fn vector_names(&self) -> Vec<String> {
        let names_b: HashSet<String> = self.provider_b.vector_names().into_iter().collect();
        self.provider_a
            .vector_names()
            .into_iter()
            .filter(|name| names_b.contains(name))
            .collect()
    }

    fn vector_names_filtered_by_value(
        &self,
        exclude_all_values_zero: bool,
        exclude_constant_values: bool,
    ) -> Result<Vec<String>, SummaryError> {
        let table = self.get_vectors_df(&self.vector_names(), None, None)?;
        Ok(filter_vector_names_by_value(
            &table,
            exclude_all_values_zero,
            exclude_constant_values,
        ))
    }

    fn realizations(&self) -> Vec<i32> {
        let reals_b: HashSet<i32> = self.provider_b.realizations().into_iter().collect();
        self.provider_a
            .realizations()
            .into_iter()
            .filter(|real| reals_b.contains(real))
            .collect()
    }

    fn vector_metadata(&self, vector_name: &str) -> Result<Option<VectorMetadata>, SummaryError> {
        let meta_a = self.provider_a.vector_metadata(vector_name)?;
        let meta_b = self.provider_b.vector_metadata(vector_name)?;
        match (meta_a, meta_b) {
            (None, None) => Ok(None),
            (Some(a), Some(b)) if a == b => Ok(Some(a)),
            _ => Err(SummaryError::InconsistentMetadata {
                vector_name: vector_name.to_string(),
            }),
        }
    }

    fn supports_resampling(&self) -> bool {
        self.provider_a.supports_resampling()
    }

    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<Vec<NaiveDateTime>, SummaryError> {
        let realizations = self.common_realizations(realizations);
        let dates_b: HashSet<NaiveDateTime> = self
            .provider_b
            .dates(frequency, Some(&realizations))?
            .into_iter()
            .collect();
        Ok(self
            .provider_a
            .dates(frequency, Some(&realizations))?
            .into_iter()
            .filter(|date| dates_b.contains(date))
            .collect())
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    fn get_vectors_df(
        &self,
        vector_names: &[String],
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        check_vector_names(&self.vector_names(), vector_names)?;
        let realizations = self.common_realizations(realizations);
        let a = self
            .provider_a
            .get_vectors_df(vector_names, frequency, Some(&realizations))?;
        let b = self
            .provider_b
            .get_vectors_df(vector_names, frequency, Some(&realizations))?;
        subtract_aligned(&a, &b)
    }

    fn get_vectors_for_date_df(
        &self,
        date: NaiveDateTime,
        vector_names: &[String],
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError> {
        check_vector_names(&self.vector_names(), vector_names)?;
        let realizations = self.common_realizations(realizations);
        let a = self
            .provider_a
            .get_vectors_for_date_df(date, vector_names, Some(&realizations))?;
        let b = self
            .provider_b
            .get_vectors_for_date_df(date, vector_names, Some(&realizations))?;
        subtract_aligned(&a, &b)
    }
}
