//! Resampling of raw per-realization series onto calendar sample dates.
//!
//! Totals and other state vectors are linearly interpolated in time and held at the first/last
//! raw value outside the raw range. Rates are treated as backfilled: a rate reported at `t_i`
//! holds over `(t_{i-1}, t_i]`, and a resampled rate at `s_k` is the time-weighted average over
//! `(s_{k-1}, s_k]`. Rates are zero outside the raw range.

use chrono::NaiveDateTime;
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::error::SummaryError;
use crate::frequency::{generate_normalized_sample_dates, Frequency};
use crate::table::TimeSeriesTable;

fn seconds(date: &NaiveDateTime) -> f64 {
    date.and_utc().timestamp() as f64
}

/// Linear interpolation of `(xp, yp)` at `x`, clamped at both ends.
fn interpolate(xp: &[f64], yp: ArrayView1<f64>, x: f64) -> f64 {
    let n = xp.len();
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return yp[0];
    }
    if x >= xp[n - 1] {
        return yp[n - 1];
    }
    // xp[i - 1] <= x < xp[i]
    let i = xp.partition_point(|&v| v <= x);
    let t = (x - xp[i - 1]) / (xp[i] - xp[i - 1]);
    yp[i - 1] + (yp[i] - yp[i - 1]) * t
}

/// Value of the backfilled rate step function at `x`.
fn backfill(xp: &[f64], yp: ArrayView1<f64>, x: f64) -> f64 {
    let n = xp.len();
    if n == 0 || x < xp[0] || x > xp[n - 1] {
        return 0.0;
    }
    yp[xp.partition_point(|&v| v < x)]
}

/// Integral of the backfilled rate step function from the first raw date up to each raw date.
fn cumulative_integral(xp: &[f64], yp: ArrayView1<f64>) -> Vec<f64> {
    let mut integral = Vec::with_capacity(xp.len());
    let mut acc = 0.0;
    for i in 0..xp.len() {
        if i > 0 {
            acc += yp[i] * (xp[i] - xp[i - 1]);
        }
        integral.push(acc);
    }
    integral
}

/// Integral of the backfilled rate step function up to `x`.
fn integral_at(xp: &[f64], yp: ArrayView1<f64>, integral: &[f64], x: f64) -> f64 {
    let n = xp.len();
    if n == 0 || x <= xp[0] {
        return 0.0;
    }
    if x >= xp[n - 1] {
        return integral[n - 1];
    }
    let i = xp.partition_point(|&v| v <= x);
    integral[i - 1] + yp[i] * (x - xp[i - 1])
}

/// Resample one vector of one realization.
///
/// # Arguments
///
/// * `dates`: Raw dates, ascending
/// * `values`: Raw values, one per date
/// * `is_rate`: Whether the vector is a rate
/// * `sample_dates`: Dates to sample at, ascending
pub fn resample_realization(
    dates: &[NaiveDateTime],
    values: ArrayView1<f64>,
    is_rate: bool,
    sample_dates: &[NaiveDateTime],
) -> Array1<f64> {
    let xp: Vec<f64> = dates.iter().map(seconds).collect();
    let x: Vec<f64> = sample_dates.iter().map(seconds).collect();
    if !is_rate {
        return x.iter().map(|&xi| interpolate(&xp, values, xi)).collect();
    }

    let integral = cumulative_integral(&xp, values);
    let mut resampled = Array1::zeros(x.len());
    for (k, &xk) in x.iter().enumerate() {
        resampled[k] = if k == 0 {
            backfill(&xp, values, xk)
        } else {
            let span = xk - x[k - 1];
            let area = integral_at(&xp, values, &integral, xk)
                - integral_at(&xp, values, &integral, x[k - 1]);
            if span > 0.0 {
                area / span
            } else {
                0.0
            }
        };
    }
    resampled
}

/// Resample every realization of a table onto shared sample dates.
///
/// The sample dates span the earliest to the latest date over all realizations, so every
/// realization gets the same dates. Realizations are processed in parallel.
///
/// # Arguments
///
/// * `table`: Raw table
/// * `frequency`: Target frequency
/// * `rate_flags`: Whether each vector of `table` is a rate, in column order
pub fn resample_table(
    table: &TimeSeriesTable,
    frequency: Frequency,
    rate_flags: &[bool],
) -> Result<TimeSeriesTable, SummaryError> {
    if rate_flags.len() != table.vector_names().len() {
        return Err(SummaryError::InvalidTable {
            reason: format!(
                "{} rate flags for {} vectors",
                rate_flags.len(),
                table.vector_names().len()
            ),
        });
    }
    let sorted = table.sorted_by_real_and_date();
    let Some((min_date, max_date)) = sorted.date_range() else {
        return Ok(TimeSeriesTable::empty(table.vector_names().to_vec()));
    };
    let sample_dates = generate_normalized_sample_dates(min_date, max_date, frequency);
    let groups = sorted.group_ranges();

    let blocks: Vec<Array2<f64>> = groups
        .par_iter()
        .map(|range| {
            let dates = &sorted.dates()[range.clone()];
            let values = sorted.values();
            let mut block = Array2::zeros((sample_dates.len(), rate_flags.len()));
            for (column, &is_rate) in rate_flags.iter().enumerate() {
                let raw = values.slice(s![range.clone(), column]);
                block
                    .column_mut(column)
                    .assign(&resample_realization(dates, raw, is_rate, &sample_dates));
            }
            block
        })
        .collect();

    let num_samples = sample_dates.len();
    let mut values = Array2::zeros((groups.len() * num_samples, rate_flags.len()));
    let mut dates = Vec::with_capacity(groups.len() * num_samples);
    let mut reals = Vec::with_capacity(groups.len() * num_samples);
    let mut ensembles = Vec::new();
    for (index, (range, block)) in groups.iter().zip(blocks).enumerate() {
        let offset = index * num_samples;
        values
            .slice_mut(s![offset..offset + num_samples, ..])
            .assign(&block);
        dates.extend_from_slice(&sample_dates);
        reals.extend(std::iter::repeat(sorted.reals()[range.start]).take(num_samples));
        if let Some(source) = sorted.ensembles() {
            ensembles.extend(std::iter::repeat(source[range.start].clone()).take(num_samples));
        }
    }

    let resampled = TimeSeriesTable::new(dates, reals, table.vector_names().to_vec(), values)?;
    match sorted.ensembles() {
        Some(_) => resampled.with_ensembles(ensembles),
        None => Ok(resampled),
    }
}

/// Sample every realization of a table at a single date.
///
/// Totals are interpolated and rates take the backfilled value at `date`.
pub fn sample_at_date(
    table: &TimeSeriesTable,
    date: NaiveDateTime,
    rate_flags: &[bool],
) -> Result<TimeSeriesTable, SummaryError> {
    let sorted = table.sorted_by_real_and_date();
    let groups = sorted.group_ranges();
    let x = seconds(&date);
    let mut values = Array2::zeros((groups.len(), rate_flags.len()));
    for (row, range) in groups.iter().enumerate() {
        let xp: Vec<f64> = sorted.dates()[range.clone()].iter().map(seconds).collect();
        for (column, &is_rate) in rate_flags.iter().enumerate() {
            let raw = sorted.values().slice_move(s![range.clone(), column]);
            values[[row, column]] = if is_rate {
                backfill(&xp, raw, x)
            } else {
                interpolate(&xp, raw, x)
            };
        }
    }
    let reals = groups.iter().map(|range| sorted.reals()[range.start]).collect();
    let sampled = TimeSeriesTable::new(
        vec![date; groups.len()],
        reals,
        table.vector_names().to_vec(),
        values,
    )?;
    match sorted.ensembles() {
        Some(source) => {
            sampled.with_ensembles(groups.iter().map(|r| source[r.start].clone()).collect())
        }
        None => Ok(sampled),
    }
}
