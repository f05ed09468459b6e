//! Ensemble summary providers.
//!
//! Each provider implements the [EnsembleSummaryProvider] trait. All data access from consumers
//! goes through that trait, so a consumer never knows whether a provider resamples on demand,
//! serves presampled data, or is the difference between two other providers.

pub mod delta;
pub mod lazy;
pub mod presampled;

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::arrow_io::RealizationSummary;
use crate::error::SummaryError;
use crate::frequency::Frequency;
use crate::naming::{vector_keyword, vector_qualifier};
use crate::table::TimeSeriesTable;

pub use delta::DeltaEnsembleProvider;
pub use lazy::ProviderImplArrowLazy;
pub use presampled::ProviderImplArrowPresampled;

/// Metadata of a single summary vector.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VectorMetadata {
    /// Unit string, e.g. `SM3/DAY`
    pub unit: String,
    /// Cumulative (total) vector
    pub is_total: bool,
    /// Rate vector
    pub is_rate: bool,
    /// Historical (observed) vector
    pub is_historical: bool,
    /// Keyword part of the vector name
    pub keyword: String,
    /// Well or group name
    pub wgname: Option<String>,
    /// Region, block or completion number
    pub get_num: Option<i32>,
}

impl VectorMetadata {
    /// Best-effort metadata derived from an Eclipse style vector name.
    ///
    /// Used when an input file carries no metadata for a vector. The fourth keyword character
    /// marks rates (`R`) and totals (`T`); a trailing `H` on a keyword of five or more
    /// characters marks historical vectors. The unit is unknown.
    pub fn from_vector_name(vector_name: &str) -> Self {
        let keyword = vector_keyword(vector_name);
        let is_historical = keyword.len() >= 5 && keyword.ends_with('H');
        let marker = keyword.chars().nth(3);
        let qualifier = vector_qualifier(vector_name);
        let (wgname, get_num) = match keyword.chars().next() {
            Some('W') | Some('G') => (qualifier.map(str::to_string), None),
            Some('R') | Some('B') | Some('C') => {
                (None, qualifier.and_then(|q| q.parse::<i32>().ok()))
            }
            _ => (None, None),
        };
        VectorMetadata {
            unit: String::new(),
            is_total: marker == Some('T'),
            is_rate: marker == Some('R'),
            is_historical,
            keyword: keyword.to_string(),
            wgname,
            get_num,
        }
    }
}

/// Read access to one ensemble's summary data.
///
/// Providers are immutable once constructed and are shared between consumers as
/// `Arc<dyn EnsembleSummaryProvider>`.
pub trait EnsembleSummaryProvider: std::fmt::Debug + Send + Sync {
    /// All vector names available.
    fn vector_names(&self) -> Vec<String>;

    /// Vector names, optionally without vectors whose values are all zero or constant.
    ///
    /// # Arguments
    ///
    /// * `exclude_all_values_zero`: Skip vectors where every value is zero
    /// * `exclude_constant_values`: Skip vectors where every value is the same
    fn vector_names_filtered_by_value(
        &self,
        exclude_all_values_zero: bool,
        exclude_constant_values: bool,
    ) -> Result<Vec<String>, SummaryError>;

    /// Sorted realizations.
    fn realizations(&self) -> Vec<i32>;

    /// Metadata for a vector, `None` for an unknown vector.
    fn vector_metadata(&self, vector_name: &str) -> Result<Option<VectorMetadata>, SummaryError>;

    /// Whether [EnsembleSummaryProvider::get_vectors_df] can resample to any frequency.
    fn supports_resampling(&self) -> bool;

    /// Sample dates at a frequency, optionally limited to some realizations.
    fn dates(
        &self,
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<Vec<NaiveDateTime>, SummaryError>;

    /// Vector values for all dates, sorted by `(REAL, DATE)`.
    ///
    /// # Arguments
    ///
    /// * `vector_names`: Vectors to fetch. Any unknown vector is an error.
    /// * `frequency`: Resampling frequency, `None` for the provider's native sampling
    /// * `realizations`: Realizations to fetch, `None` for all
    fn get_vectors_df(
        &self,
        vector_names: &[String],
        frequency: Option<Frequency>,
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError>;

    /// Vector values at a single date, one row per realization.
    fn get_vectors_for_date_df(
        &self,
        date: NaiveDateTime,
        vector_names: &[String],
        realizations: Option<&[i32]>,
    ) -> Result<TimeSeriesTable, SummaryError>;
}

/// Fail with [SummaryError::UnknownVector] for the first requested vector not available.
pub(crate) fn check_vector_names(
    available: &[String],
    requested: &[String],
) -> Result<(), SummaryError> {
    match requested.iter().find(|name| !available.contains(name)) {
        Some(name) => Err(SummaryError::UnknownVector {
            vector_name: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Vector names of a table filtered on their values. `NaN` values are ignored.
pub(crate) fn filter_vector_names_by_value(
    table: &TimeSeriesTable,
    exclude_all_values_zero: bool,
    exclude_constant_values: bool,
) -> Vec<String> {
    table
        .vector_names()
        .iter()
        .zip(table.values().columns())
        .filter(|(_, column)| {
            let mut values = column.iter().copied().filter(|v| !v.is_nan());
            let first = values.clone().next();
            let all_zero = values.clone().all(|v| v == 0.0);
            let constant = match first {
                Some(first) => values.all(|v| v == first),
                None => true,
            };
            !(exclude_all_values_zero && all_zero) && !(exclude_constant_values && constant)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Whether each vector is a rate, falling back to name heuristics without metadata.
pub(crate) fn rate_flags(
    metadata: &HashMap<String, VectorMetadata>,
    vector_names: &[String],
) -> Vec<bool> {
    vector_names
        .iter()
        .map(|name| match metadata.get(name) {
            Some(meta) => meta.is_rate,
            None => VectorMetadata::from_vector_name(name).is_rate,
        })
        .collect()
}

/// Combine per-realization summaries into one table and one metadata map.
///
/// Realizations should agree on vector metadata. Disagreement is logged as a warning and the
/// metadata of the first realization carrying the vector is kept. Vectors without metadata in
/// any realization get [VectorMetadata::from_vector_name].
pub(crate) fn combine_realizations(
    summaries: &[RealizationSummary],
) -> (TimeSeriesTable, HashMap<String, VectorMetadata>) {
    let tables: Vec<TimeSeriesTable> = summaries.iter().map(|s| s.table.clone()).collect();
    let table = TimeSeriesTable::concat(&tables).sorted_by_real_and_date();

    let mut metadata: HashMap<String, (i32, VectorMetadata)> = HashMap::new();
    for summary in summaries {
        let realization = summary.table.realizations().first().copied().unwrap_or_default();
        for (name, meta) in &summary.metadata {
            match metadata.get(name) {
                Some((first_realization, existing)) if existing != meta => {
                    warn!(
                        vector = name.as_str(),
                        realization,
                        first_realization,
                        "vector metadata differs between realizations, keeping the first"
                    );
                }
                Some(_) => (),
                None => {
                    metadata.insert(name.clone(), (realization, meta.clone()));
                }
            }
        }
    }
    let mut metadata: HashMap<String, VectorMetadata> = metadata
        .into_iter()
        .map(|(name, (_, meta))| (name, meta))
        .collect();
    for name in table.vector_names() {
        metadata
            .entry(name.clone())
            .or_insert_with(|| VectorMetadata::from_vector_name(name));
    }
    (table, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::datetime;
    use ndarray::array;

    #[test]
    fn metadata_from_name() {
        let meta = VectorMetadata::from_vector_name("WOPT:OP_1");
        assert!(meta.is_total);
        assert!(!meta.is_rate);
        assert!(!meta.is_historical);
        assert_eq!("WOPT", meta.keyword);
        assert_eq!(Some("OP_1".to_string()), meta.wgname);
        assert_eq!(None, meta.get_num);

        let meta = VectorMetadata::from_vector_name("RPR:2");
        assert_eq!(Some(2), meta.get_num);
        assert_eq!(None, meta.wgname);

        let meta = VectorMetadata::from_vector_name("FOPRH");
        assert!(meta.is_rate);
        assert!(meta.is_historical);

        let meta = VectorMetadata::from_vector_name("FPR");
        assert!(!meta.is_rate);
        assert!(!meta.is_total);
    }

    #[test]
    fn unknown_vector_check() {
        let available = vec!["FOPT".to_string()];
        assert!(check_vector_names(&available, &["FOPT".to_string()]).is_ok());
        assert!(matches!(
            check_vector_names(&available, &["FOPT".to_string(), "FGPT".to_string()]),
            Err(SummaryError::UnknownVector { vector_name }) if vector_name == "FGPT"
        ));
    }

    #[test]
    fn filter_by_value() {
        let table = TimeSeriesTable::new(
            vec![datetime(2000, 1, 1), datetime(2000, 2, 1)],
            vec![0, 0],
            vec!["ZERO".to_string(), "CONST".to_string(), "VARY".to_string()],
            array![[0.0, 3.0, 1.0], [0.0, 3.0, f64::NAN]],
        )
        .unwrap();
        let all = filter_vector_names_by_value(&table, false, false);
        assert_eq!(3, all.len());
        assert_eq!(
            vec!["CONST".to_string(), "VARY".to_string()],
            filter_vector_names_by_value(&table, true, false)
        );
        // A single non-NaN value counts as constant.
        assert!(filter_vector_names_by_value(&table, false, true).is_empty());
    }

    #[test]
    fn combine_warns_and_keeps_first_metadata() {
        let mut first = HashMap::new();
        first.insert(
            "FOPT".to_string(),
            VectorMetadata {
                unit: "SM3".to_string(),
                ..VectorMetadata::from_vector_name("FOPT")
            },
        );
        let mut second = HashMap::new();
        second.insert(
            "FOPT".to_string(),
            VectorMetadata {
                unit: "STB".to_string(),
                ..VectorMetadata::from_vector_name("FOPT")
            },
        );
        let make = |real: i32, metadata: HashMap<String, VectorMetadata>| RealizationSummary {
            table: TimeSeriesTable::new(
                vec![datetime(2000, 1, 1)],
                vec![real],
                vec!["FOPT".to_string(), "FOPR".to_string()],
                array![[1.0, 2.0]],
            )
            .unwrap(),
            metadata,
        };
        let (table, metadata) = combine_realizations(&[make(1, first), make(0, second)]);
        assert_eq!(&[0, 1], table.reals());
        assert_eq!("SM3", metadata["FOPT"].unit);
        assert!(metadata["FOPR"].is_rate);
    }
}
