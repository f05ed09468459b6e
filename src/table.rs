//! Tidy time series table of `DATE`, `REAL`, optional `ENSEMBLE` and vector columns.
//!
//! Vector values live in a dense [ndarray] matrix with one row per `(DATE, REAL)` sample and one
//! column per vector.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use chrono::NaiveDateTime;
use ndarray::prelude::*;

use crate::error::SummaryError;

/// Name of the date column
pub const DATE_COLUMN: &str = "DATE";
/// Name of the realization column
pub const REAL_COLUMN: &str = "REAL";
/// Name of the ensemble column
pub const ENSEMBLE_COLUMN: &str = "ENSEMBLE";

/// A tidy table of vector samples.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeriesTable {
    dates: Vec<NaiveDateTime>,
    reals: Vec<i32>,
    ensembles: Option<Vec<String>>,
    vector_names: Vec<String>,
    values: Array2<f64>,
}

fn invalid(reason: impl Into<String>) -> SummaryError {
    SummaryError::InvalidTable {
        reason: reason.into(),
    }
}

impl TimeSeriesTable {
    /// Returns a new table.
    ///
    /// # Arguments
    ///
    /// * `dates`: Date of each row
    /// * `reals`: Realization of each row
    /// * `vector_names`: Name of each value column
    /// * `values`: Matrix of shape `(rows, vectors)`
    pub fn new(
        dates: Vec<NaiveDateTime>,
        reals: Vec<i32>,
        vector_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, SummaryError> {
        if dates.len() != reals.len() {
            return Err(invalid(format!(
                "{} dates but {} realizations",
                dates.len(),
                reals.len()
            )));
        }
        if values.dim() != (dates.len(), vector_names.len()) {
            return Err(invalid(format!(
                "value matrix has shape {:?}, expected ({}, {})",
                values.dim(),
                dates.len(),
                vector_names.len()
            )));
        }
        let mut seen = HashSet::new();
        for name in &vector_names {
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("duplicate vector {}", name)));
            }
        }
        Ok(Self {
            dates,
            reals,
            ensembles: None,
            vector_names,
            values,
        })
    }

    /// Returns an empty table with the given vector columns.
    pub fn empty(vector_names: Vec<String>) -> Self {
        let values = Array2::zeros((0, vector_names.len()));
        Self {
            dates: vec![],
            reals: vec![],
            ensembles: None,
            vector_names,
            values,
        }
    }

    /// Attach an `ENSEMBLE` column.
    pub fn with_ensembles(mut self, ensembles: Vec<String>) -> Result<Self, SummaryError> {
        if ensembles.len() != self.num_rows() {
            return Err(invalid(format!(
                "{} ensemble labels for {} rows",
                ensembles.len(),
                self.num_rows()
            )));
        }
        self.ensembles = Some(ensembles);
        Ok(self)
    }

    pub fn num_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }

    pub fn reals(&self) -> &[i32] {
        &self.reals
    }

    pub fn ensembles(&self) -> Option<&[String]> {
        self.ensembles.as_deref()
    }

    pub fn vector_names(&self) -> &[String] {
        &self.vector_names
    }

    pub fn values(&self) -> ArrayView2<f64> {
        self.values.view()
    }

    pub fn has_vector(&self, name: &str) -> bool {
        self.vector_index(name).is_some()
    }

    fn vector_index(&self, name: &str) -> Option<usize> {
        self.vector_names.iter().position(|n| n == name)
    }

    /// Values of one vector, or `None` if the vector is not in the table.
    pub fn column(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.vector_index(name)
            .map(|index| self.values.column(index))
    }

    /// Sorted unique realizations.
    pub fn realizations(&self) -> Vec<i32> {
        let reals: BTreeSet<i32> = self.reals.iter().copied().collect();
        reals.into_iter().collect()
    }

    /// Sorted unique dates.
    pub fn unique_dates(&self) -> Vec<NaiveDateTime> {
        let dates: BTreeSet<NaiveDateTime> = self.dates.iter().copied().collect();
        dates.into_iter().collect()
    }

    /// Earliest and latest date, `None` for an empty table.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.dates.iter().min()?;
        let max = self.dates.iter().max()?;
        Some((*min, *max))
    }

    /// Projection onto a subset of vectors, in the requested order.
    pub fn select_vectors(&self, names: &[String]) -> Result<Self, SummaryError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let index = self
                .vector_index(name)
                .ok_or_else(|| SummaryError::UnknownVector {
                    vector_name: name.clone(),
                })?;
            indices.push(index);
        }
        let values = self.values.select(Axis(1), &indices);
        Ok(Self {
            dates: self.dates.clone(),
            reals: self.reals.clone(),
            ensembles: self.ensembles.clone(),
            vector_names: names.to_vec(),
            values,
        })
    }

    /// Rows at the given indices, in that order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            reals: rows.iter().map(|&i| self.reals[i]).collect(),
            ensembles: self
                .ensembles
                .as_ref()
                .map(|ensembles| rows.iter().map(|&i| ensembles[i].clone()).collect()),
            vector_names: self.vector_names.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }

    /// Rows for which `predicate(date, real)` holds.
    pub fn filter_rows<F>(&self, predicate: F) -> Self
    where
        F: Fn(NaiveDateTime, i32) -> bool,
    {
        let rows: Vec<usize> = (0..self.num_rows())
            .filter(|&i| predicate(self.dates[i], self.reals[i]))
            .collect();
        self.take_rows(&rows)
    }

    /// Rows for the given realizations, or all rows for `None`.
    pub fn filter_realizations(&self, realizations: Option<&[i32]>) -> Self {
        match realizations {
            None => self.clone(),
            Some(reals) => {
                let reals: HashSet<i32> = reals.iter().copied().collect();
                self.filter_rows(|_, real| reals.contains(&real))
            }
        }
    }

    fn group_key(&self, row: usize) -> (Option<&str>, i32) {
        (
            self.ensembles.as_ref().map(|e| e[row].as_str()),
            self.reals[row],
        )
    }

    /// Stable sort on `(ENSEMBLE, REAL, DATE)`.
    pub fn sorted_by_real_and_date(&self) -> Self {
        let mut rows: Vec<usize> = (0..self.num_rows()).collect();
        rows.sort_by(|&a, &b| {
            self.group_key(a)
                .cmp(&self.group_key(b))
                .then(self.dates[a].cmp(&self.dates[b]))
        });
        self.take_rows(&rows)
    }

    /// Contiguous row ranges sharing `(ENSEMBLE, REAL)`.
    ///
    /// Only meaningful on a table sorted with [TimeSeriesTable::sorted_by_real_and_date].
    pub fn group_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for row in 1..=self.num_rows() {
            if row == self.num_rows() || self.group_key(row) != self.group_key(start) {
                if row > start {
                    ranges.push(start..row);
                }
                start = row;
            }
        }
        ranges
    }

    /// Row-wise union of tables.
    ///
    /// The vector set is the union in first-seen order. Values for vectors a table lacks are
    /// `NaN`. The ensemble column is kept only if every table has one.
    pub fn concat(tables: &[TimeSeriesTable]) -> Self {
        let mut vector_names: Vec<String> = Vec::new();
        for table in tables {
            for name in &table.vector_names {
                if !vector_names.contains(name) {
                    vector_names.push(name.clone());
                }
            }
        }
        let num_rows = tables.iter().map(|t| t.num_rows()).sum();
        let mut values = Array2::from_elem((num_rows, vector_names.len()), f64::NAN);
        let mut dates = Vec::with_capacity(num_rows);
        let mut reals = Vec::with_capacity(num_rows);
        let keep_ensembles = !tables.is_empty() && tables.iter().all(|t| t.ensembles.is_some());
        let mut ensembles = Vec::new();

        let mut offset = 0;
        for table in tables {
            for (source, name) in table.vector_names.iter().enumerate() {
                // Present by construction of vector_names above.
                if let Some(target) = vector_names.iter().position(|n| n == name) {
                    values
                        .slice_mut(s![offset..offset + table.num_rows(), target])
                        .assign(&table.values.column(source));
                }
            }
            dates.extend_from_slice(&table.dates);
            reals.extend_from_slice(&table.reals);
            if let Some(table_ensembles) = &table.ensembles {
                ensembles.extend(table_ensembles.iter().cloned());
            }
            offset += table.num_rows();
        }

        Self {
            dates,
            reals,
            ensembles: keep_ensembles.then_some(ensembles),
            vector_names,
            values,
        }
    }

    /// Check that dates ascend strictly within every `(ENSEMBLE, REAL)`.
    ///
    /// Strictly ascending dates imply `(DATE, REAL, ENSEMBLE)` uniqueness.
    pub fn validate(&self) -> Result<(), SummaryError> {
        let mut last_date: HashMap<(Option<&str>, i32), NaiveDateTime> = HashMap::new();
        for row in 0..self.num_rows() {
            let key = self.group_key(row);
            let date = self.dates[row];
            if let Some(previous) = last_date.insert(key, date) {
                if date <= previous {
                    return Err(invalid(format!(
                        "dates for realization {} are not strictly ascending at {}",
                        key.1, date
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replace the value columns, keeping the key columns.
    pub(crate) fn with_values(
        &self,
        vector_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, SummaryError> {
        let table = Self::new(self.dates.clone(), self.reals.clone(), vector_names, values)?;
        Ok(Self {
            ensembles: self.ensembles.clone(),
            ..table
        })
    }
}
