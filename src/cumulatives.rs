//! Conversion of cumulative vectors to interval deltas and average daily rates.
//!
//! The value at sample `t` is the forward difference `cumulative[t + 1] - cumulative[t]`,
//! optionally divided by the number of days between the two samples. The last sample of every
//! realization has no successor and is `0`.

use ndarray::{s, Array1, Array2, Axis};

use crate::error::SummaryError;
use crate::frequency::{frequency_name, is_finer, is_on_boundary, is_refinement, Frequency};
use crate::naming::{
    create_per_day_vector_name, create_per_interval_vector_name, get_cumulative_vector_name,
    is_per_day_vector, is_per_interval_or_per_day_vector, rename_vec_from_cum,
};
use crate::providers::{check_vector_names, EnsembleSummaryProvider};
use crate::resampling::resample_table;
use crate::table::TimeSeriesTable;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Forward differences of every column of a table sorted by `(ENSEMBLE, REAL, DATE)`.
///
/// Rows whose successor belongs to another realization, and the last row, are `0`. With
/// `as_rate` each difference is divided by the forward day count, `0` where that count is `0`.
/// `NaN` results are replaced by `0`.
fn forward_differences(table: &TimeSeriesTable, as_rate: bool) -> Array2<f64> {
    let num_rows = table.num_rows();
    let values = table.values();
    let mut diffs = Array2::zeros(values.raw_dim());
    if num_rows < 2 {
        return diffs;
    }
    diffs
        .slice_mut(s![..num_rows - 1, ..])
        .assign(&(&values.slice(s![1.., ..]) - &values.slice(s![..num_rows - 1, ..])));

    // Realization id per row, its forward difference marks realization boundaries.
    let mut group_ids = Array1::<f64>::zeros(num_rows);
    for (id, range) in table.group_ranges().into_iter().enumerate() {
        group_ids.slice_mut(s![range]).fill(id as f64);
    }
    let mut keep = Array1::<f64>::zeros(num_rows);
    keep.slice_mut(s![..num_rows - 1]).assign(
        &(&group_ids.slice(s![1..]) - &group_ids.slice(s![..num_rows - 1]))
            .mapv(|step| if step == 0.0 { 1.0 } else { 0.0 }),
    );

    let dates = table.dates();
    let mut days = Array1::<f64>::zeros(num_rows);
    for row in 0..num_rows - 1 {
        days[row] = (dates[row + 1] - dates[row]).num_seconds() as f64 / SECONDS_PER_DAY;
    }

    for (mut row, (&same_group, &num_days)) in
        diffs.axis_iter_mut(Axis(0)).zip(keep.iter().zip(&days))
    {
        row.mapv_inplace(|delta| {
            let delta = delta * same_group;
            let value = match as_rate {
                false => delta,
                true if num_days == 0.0 => 0.0,
                true => delta / num_days,
            };
            if value.is_nan() {
                0.0
            } else {
                value
            }
        });
    }
    diffs
}

/// Interval deltas or average daily rates of cumulative vectors.
///
/// Output rows are sorted by `(ENSEMBLE, REAL, DATE)` and the output columns are named
/// `AVG_<vector>` for rates and `INTVL_<vector>` for deltas.
///
/// # Arguments
///
/// * `table`: Table with the cumulative vectors, at a uniform sampling
/// * `vector_names`: Cumulative vectors to convert
/// * `as_rate`: Average daily rates instead of interval deltas
pub fn compute_per_interval_or_per_day(
    table: &TimeSeriesTable,
    vector_names: &[String],
    as_rate: bool,
) -> Result<TimeSeriesTable, SummaryError> {
    check_vector_names(table.vector_names(), vector_names)?;
    let selected = table.select_vectors(vector_names)?.sorted_by_real_and_date();
    let derived_names = vector_names
        .iter()
        .map(|name| match as_rate {
            true => create_per_day_vector_name(name),
            false => create_per_interval_vector_name(name),
        })
        .collect();
    selected.with_values(derived_names, forward_differences(&selected, as_rate))
}

/// Interval deltas or average daily rates at a frequency at or coarser than the input.
///
/// Input on a `time_index_input` grid that refines `time_index` is reduced to the rows on
/// `time_index` boundaries. Any other input, raw or irregular, is resampled to `time_index`
/// first, interpolating the cumulative values. Each delta then spans one `time_index` period. Rate columns are named from the cumulative name
/// (`FOPT` gives `AVG_FOPR`) and delta columns `INTVL_<vector>`.
///
/// # Arguments
///
/// * `table`: Table with cumulative vectors
/// * `column_keys`: Cumulative vectors to convert
/// * `time_index`: Output frequency, `None` for the raw dates
/// * `time_index_input`: Frequency of the input, `None` for raw data
/// * `as_rate`: Average daily rates instead of interval deltas
#[tracing::instrument(level = "DEBUG", skip(table))]
pub fn calc_from_cumulatives(
    table: &TimeSeriesTable,
    column_keys: &[String],
    time_index: Option<Frequency>,
    time_index_input: Option<Frequency>,
    as_rate: bool,
) -> Result<TimeSeriesTable, SummaryError> {
    if is_finer(time_index, time_index_input) {
        return Err(SummaryError::FrequencyTooFine {
            requested: frequency_name(time_index),
            input: frequency_name(time_index_input),
        });
    }
    check_vector_names(table.vector_names(), column_keys)?;

    let mut selected = table.select_vectors(column_keys)?.sorted_by_real_and_date();
    if let Some(output) = time_index {
        // Rows can only be filtered when the input already sits on a grid refining the output.
        let on_input_grid = time_index_input.is_some_and(|input| {
            is_refinement(input, output)
                && selected.dates().iter().all(|date| is_on_boundary(*date, input))
        });
        selected = match on_input_grid {
            true => selected.filter_rows(|date, _| is_on_boundary(date, output)),
            false => resample_table(&selected, output, &vec![false; column_keys.len()])?,
        };
    }

    let derived_names = column_keys
        .iter()
        .map(|name| rename_vec_from_cum(name, as_rate))
        .collect();
    selected.with_values(derived_names, forward_differences(&selected, as_rate))
}

/// Plain and derived vectors from a provider in one table.
///
/// Derived vectors (`AVG_<vector>`, `INTVL_<vector>`) are computed from their cumulative vector
/// at the requested frequency. Columns follow the order of `vector_names`.
///
/// # Arguments
///
/// * `provider`: Provider of the cumulative and plain vectors
/// * `vector_names`: Plain and derived vector names
/// * `frequency`: Sampling frequency passed to the provider
/// * `realizations`: Realizations to fetch, `None` for all
pub fn get_vectors_with_derived(
    provider: &dyn EnsembleSummaryProvider,
    vector_names: &[String],
    frequency: Option<Frequency>,
    realizations: Option<&[i32]>,
) -> Result<TimeSeriesTable, SummaryError> {
    let mut source_names: Vec<String> = Vec::new();
    for name in vector_names {
        let source = match is_per_interval_or_per_day_vector(name) {
            true => get_cumulative_vector_name(name)?,
            false => name.as_str(),
        };
        if !source_names.iter().any(|n| n == source) {
            source_names.push(source.to_string());
        }
    }
    let source = provider
        .get_vectors_df(&source_names, frequency, realizations)?
        .sorted_by_real_and_date();

    let mut values = Array2::zeros((source.num_rows(), vector_names.len()));
    for (index, name) in vector_names.iter().enumerate() {
        let column = match is_per_interval_or_per_day_vector(name) {
            true => {
                let cumulative = get_cumulative_vector_name(name)?.to_string();
                let derived =
                    compute_per_interval_or_per_day(&source, &[cumulative], is_per_day_vector(name))?;
                derived.values().column(0).to_owned()
            }
            false => match source.column(name) {
                Some(column) => column.to_owned(),
                None => {
                    return Err(SummaryError::UnknownVector {
                        vector_name: name.clone(),
                    })
                }
            },
        };
        values.column_mut(index).assign(&column);
    }
    source.with_values(vector_names.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderImplArrowLazy;
    use crate::test_utils::{datetime, monthly_ensemble_table};
    use ndarray::array;
    use std::collections::HashMap;

    const EPS: f64 = 1e-9;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    /// Value of a column at a single `(ENSEMBLE, REAL, DATE)`.
    fn value_at(
        table: &TimeSeriesTable,
        vector_name: &str,
        ensemble: &str,
        real: i32,
        date: chrono::NaiveDateTime,
    ) -> f64 {
        let ensembles = table.ensembles().unwrap();
        let row = (0..table.num_rows())
            .find(|&row| {
                ensembles[row] == ensemble && table.reals()[row] == real && table.dates()[row] == date
            })
            .unwrap();
        table.column(vector_name).unwrap()[row]
    }

    fn two_realizations() -> TimeSeriesTable {
        TimeSeriesTable::new(
            vec![
                datetime(2000, 1, 1),
                datetime(2000, 1, 11),
                datetime(2000, 1, 31),
                datetime(2000, 1, 1),
                datetime(2000, 1, 11),
                datetime(2000, 1, 31),
            ],
            vec![1, 1, 1, 0, 0, 0],
            names(&["FOPT"]),
            array![[0.0], [10.0], [50.0], [0.0], [20.0], [20.0]],
        )
        .unwrap()
    }

    #[test]
    fn interval_deltas() {
        let table =
            compute_per_interval_or_per_day(&two_realizations(), &names(&["FOPT"]), false).unwrap();
        assert_eq!(names(&["INTVL_FOPT"]), table.vector_names());
        assert_eq!(&[0, 0, 0, 1, 1, 1], table.reals());
        assert_eq!(
            array![20.0, 0.0, 0.0, 10.0, 40.0, 0.0],
            table.column("INTVL_FOPT").unwrap()
        );
    }

    #[test]
    fn rates_divide_by_days() {
        let deltas =
            compute_per_interval_or_per_day(&two_realizations(), &names(&["FOPT"]), false).unwrap();
        let rates =
            compute_per_interval_or_per_day(&two_realizations(), &names(&["FOPT"]), true).unwrap();
        assert_eq!(names(&["AVG_FOPT"]), rates.vector_names());
        let deltas = deltas.column("INTVL_FOPT").unwrap();
        let rates = rates.column("AVG_FOPT").unwrap();
        let dates = two_realizations().sorted_by_real_and_date().dates().to_vec();
        for row in 0..dates.len() {
            if deltas[row] == 0.0 {
                assert_eq!(0.0, rates[row]);
            } else {
                let days = (dates[row + 1] - dates[row]).num_days() as f64;
                assert!((rates[row] - deltas[row] / days).abs() < EPS);
            }
        }
        assert!((rates[0] - 2.0).abs() < EPS);
        assert!((rates[4] - 2.0).abs() < EPS);
    }

    #[test]
    fn zero_at_realization_boundaries() {
        let table = monthly_ensemble_table();
        let deltas = compute_per_interval_or_per_day(&table, &names(&["FOPT"]), false).unwrap();
        let column = deltas.column("INTVL_FOPT").unwrap();
        for range in deltas.group_ranges() {
            assert_eq!(0.0, column[range.end - 1]);
            assert!(column[range.start] > 0.0);
        }
    }

    #[test]
    fn nan_becomes_zero() {
        let table = TimeSeriesTable::new(
            vec![datetime(2000, 1, 1), datetime(2000, 2, 1), datetime(2000, 3, 1)],
            vec![0, 0, 0],
            names(&["FOPT"]),
            array![[1.0], [f64::NAN], [3.0]],
        )
        .unwrap();
        let rates = compute_per_interval_or_per_day(&table, &names(&["FOPT"]), true).unwrap();
        assert_eq!(array![0.0, 0.0, 0.0], rates.column("AVG_FOPT").unwrap());
    }

    #[test]
    fn single_row_and_empty() {
        let table = TimeSeriesTable::new(
            vec![datetime(2000, 1, 1)],
            vec![0],
            names(&["FOPT"]),
            array![[1.0]],
        )
        .unwrap();
        let rates = compute_per_interval_or_per_day(&table, &names(&["FOPT"]), true).unwrap();
        assert_eq!(array![0.0], rates.column("AVG_FOPT").unwrap());
        let empty = TimeSeriesTable::empty(names(&["FOPT"]));
        assert!(compute_per_interval_or_per_day(&empty, &names(&["FOPT"]), true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn monthly_rates() {
        let table = monthly_ensemble_table();
        let rates = calc_from_cumulatives(
            &table,
            &names(&["FOPT"]),
            Some(Frequency::Monthly),
            Some(Frequency::Monthly),
            true,
        )
        .unwrap();
        assert_eq!(names(&["AVG_FOPR"]), rates.vector_names());
        let expected = (value_at(&table, "FOPT", "iter-2", 0, datetime(2000, 2, 1))
            - value_at(&table, "FOPT", "iter-2", 0, datetime(2000, 1, 1)))
            / 31.0;
        let actual = value_at(&rates, "AVG_FOPR", "iter-2", 0, datetime(2000, 1, 1));
        assert!((expected - actual).abs() < EPS);
    }

    #[test]
    fn yearly_rates_from_monthly_input() {
        let table = monthly_ensemble_table();
        let rates = calc_from_cumulatives(
            &table,
            &names(&["WOPT:OP_1", "GOPT:OP"]),
            Some(Frequency::Yearly),
            Some(Frequency::Monthly),
            true,
        )
        .unwrap();
        assert_eq!(names(&["AVG_WOPR:OP_1", "AVG_GOPR:OP"]), rates.vector_names());
        assert_eq!(
            vec![
                datetime(2000, 1, 1),
                datetime(2001, 1, 1),
                datetime(2002, 1, 1),
                datetime(2003, 1, 1)
            ],
            rates.unique_dates()
        );
        let expected = (value_at(&table, "WOPT:OP_1", "iter-0", 4, datetime(2001, 1, 1))
            - value_at(&table, "WOPT:OP_1", "iter-0", 4, datetime(2000, 1, 1)))
            / 366.0;
        let actual = value_at(&rates, "AVG_WOPR:OP_1", "iter-0", 4, datetime(2000, 1, 1));
        assert!((expected - actual).abs() < EPS);
        assert_eq!(
            0.0,
            value_at(&rates, "AVG_GOPR:OP", "iter-0", 4, datetime(2003, 1, 1))
        );
    }

    #[test]
    fn yearly_deltas() {
        let table = monthly_ensemble_table();
        let deltas = calc_from_cumulatives(
            &table,
            &names(&["FOPT"]),
            Some(Frequency::Yearly),
            Some(Frequency::Monthly),
            false,
        )
        .unwrap();
        assert_eq!(names(&["INTVL_FOPT"]), deltas.vector_names());
        let expected = value_at(&table, "FOPT", "iter-1", 3, datetime(2002, 1, 1))
            - value_at(&table, "FOPT", "iter-1", 3, datetime(2001, 1, 1));
        let actual = value_at(&deltas, "INTVL_FOPT", "iter-1", 3, datetime(2001, 1, 1));
        assert!((expected - actual).abs() < EPS);
    }

    #[test]
    fn output_finer_than_input() {
        let table = monthly_ensemble_table();
        let cases = [
            (
                names(&["WGPT:OP_2", "GWPT:OP"]),
                Some(Frequency::Daily),
                Some(Frequency::Monthly),
                true,
            ),
            (
                names(&["WGPT:OP_2", "GWPT:OP"]),
                Some(Frequency::Monthly),
                Some(Frequency::Yearly),
                false,
            ),
            (
                names(&["WGPT:OP_2", "GWPT:OP"]),
                Some(Frequency::Daily),
                Some(Frequency::Yearly),
                true,
            ),
        ];
        for (column_keys, time_index, time_index_input, as_rate) in cases {
            let result =
                calc_from_cumulatives(&table, &column_keys, time_index, time_index_input, as_rate);
            assert!(matches!(result, Err(SummaryError::FrequencyTooFine { .. })));
        }
    }

    #[test]
    fn unknown_column_key() {
        let table = monthly_ensemble_table();
        let result = calc_from_cumulatives(
            &table,
            &names(&["WGPT:OP_2"]),
            Some(Frequency::Yearly),
            Some(Frequency::Monthly),
            true,
        );
        assert!(matches!(result, Err(SummaryError::UnknownVector { .. })));
    }

    #[test]
    fn irregular_input_is_resampled_first() {
        let table = TimeSeriesTable::new(
            vec![datetime(2000, 1, 1), datetime(2000, 1, 16), datetime(2000, 3, 1)],
            vec![0, 0, 0],
            names(&["FOPT"]),
            array![[0.0], [15.0], [60.0]],
        )
        .unwrap();
        let deltas = calc_from_cumulatives(
            &table,
            &names(&["FOPT"]),
            Some(Frequency::Monthly),
            Some(Frequency::Monthly),
            false,
        )
        .unwrap();
        assert_eq!(
            vec![datetime(2000, 1, 1), datetime(2000, 2, 1), datetime(2000, 3, 1)],
            deltas.dates()
        );
        // One unit per day: 31 days in January, 29 in February 2000.
        let column = deltas.column("INTVL_FOPT").unwrap();
        assert!((column[0] - 31.0).abs() < EPS);
        assert!((column[1] - 29.0).abs() < EPS);
        assert_eq!(0.0, column[2]);
    }

    /// One realization with `FOPT` growing by `per_day` every day since 2000-01-01.
    fn linear_cumulative(dates: Vec<chrono::NaiveDateTime>, per_day: f64) -> TimeSeriesTable {
        let values = dates
            .iter()
            .map(|date| per_day * (*date - datetime(2000, 1, 1)).num_days() as f64)
            .collect::<Vec<f64>>();
        let num_rows = dates.len();
        TimeSeriesTable::new(
            dates,
            vec![0; num_rows],
            names(&["FOPT"]),
            Array2::from_shape_vec((num_rows, 1), values).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn raw_input_to_monthly() {
        let table = linear_cumulative(
            vec![
                datetime(2000, 1, 1),
                datetime(2000, 1, 20),
                datetime(2000, 2, 10),
                datetime(2000, 3, 15),
                datetime(2000, 4, 1),
            ],
            1.0,
        );
        let deltas =
            calc_from_cumulatives(&table, &names(&["FOPT"]), Some(Frequency::Monthly), None, false)
                .unwrap();
        assert_eq!(
            vec![
                datetime(2000, 1, 1),
                datetime(2000, 2, 1),
                datetime(2000, 3, 1),
                datetime(2000, 4, 1)
            ],
            deltas.dates()
        );
        let column = deltas.column("INTVL_FOPT").unwrap();
        for (actual, expected) in column.iter().zip([31.0, 29.0, 31.0, 0.0]) {
            assert!((actual - expected).abs() < EPS);
        }

        let rates =
            calc_from_cumulatives(&table, &names(&["FOPT"]), Some(Frequency::Monthly), None, true)
                .unwrap();
        let column = rates.column("AVG_FOPR").unwrap();
        for (actual, expected) in column.iter().zip([1.0, 1.0, 1.0, 0.0]) {
            assert!((actual - expected).abs() < EPS);
        }
    }

    #[test]
    fn raw_input_to_yearly_over_leap_year() {
        let table = linear_cumulative(
            vec![
                datetime(2000, 1, 1),
                datetime(2000, 5, 17),
                datetime(2001, 1, 1),
                datetime(2001, 8, 9),
                datetime(2002, 1, 1),
            ],
            2.0,
        );
        let deltas =
            calc_from_cumulatives(&table, &names(&["FOPT"]), Some(Frequency::Yearly), None, false)
                .unwrap();
        assert_eq!(
            vec![datetime(2000, 1, 1), datetime(2001, 1, 1), datetime(2002, 1, 1)],
            deltas.dates()
        );
        let column = deltas.column("INTVL_FOPT").unwrap();
        for (actual, expected) in column.iter().zip([732.0, 730.0, 0.0]) {
            assert!((actual - expected).abs() < EPS);
        }

        let rates =
            calc_from_cumulatives(&table, &names(&["FOPT"]), Some(Frequency::Yearly), None, true)
                .unwrap();
        let column = rates.column("AVG_FOPR").unwrap();
        for (actual, expected) in column.iter().zip([2.0, 2.0, 0.0]) {
            assert!((actual - expected).abs() < EPS);
        }
    }

    #[test]
    fn raw_input_off_boundaries_is_not_dropped() {
        let table = linear_cumulative(
            vec![
                datetime(2000, 1, 3),
                datetime(2000, 1, 20),
                datetime(2000, 2, 10),
                datetime(2000, 3, 15),
            ],
            1.0,
        );
        let deltas =
            calc_from_cumulatives(&table, &names(&["FOPT"]), Some(Frequency::Monthly), None, false)
                .unwrap();
        assert_eq!(4, deltas.num_rows());
        assert!(deltas.column("INTVL_FOPT").unwrap().iter().any(|v| *v > 0.0));
    }

    #[test]
    fn weekly_input_is_resampled_to_monthly() {
        // Mondays, none of them a month start.
        let table = linear_cumulative(
            vec![
                datetime(2000, 1, 3),
                datetime(2000, 1, 10),
                datetime(2000, 1, 31),
                datetime(2000, 2, 7),
                datetime(2000, 3, 6),
            ],
            1.0,
        );
        let deltas = calc_from_cumulatives(
            &table,
            &names(&["FOPT"]),
            Some(Frequency::Monthly),
            Some(Frequency::Weekly),
            false,
        )
        .unwrap();
        assert_eq!(
            vec![
                datetime(2000, 1, 1),
                datetime(2000, 2, 1),
                datetime(2000, 3, 1),
                datetime(2000, 4, 1)
            ],
            deltas.dates()
        );
        assert!((deltas.column("INTVL_FOPT").unwrap()[1] - 29.0).abs() < EPS);
    }

    #[test]
    fn derived_vectors_from_provider() {
        let table = TimeSeriesTable::new(
            vec![datetime(2000, 1, 1), datetime(2000, 1, 11), datetime(2000, 1, 21)],
            vec![0, 0, 0],
            names(&["FOPT", "FPR"]),
            array![[0.0, 7.0], [10.0, 8.0], [30.0, 9.0]],
        )
        .unwrap();
        let provider = ProviderImplArrowLazy::new(table, HashMap::new()).unwrap();
        let derived = get_vectors_with_derived(
            &provider,
            &names(&["AVG_FOPT", "FPR", "INTVL_FOPT"]),
            None,
            None,
        )
        .unwrap();
        assert_eq!(names(&["AVG_FOPT", "FPR", "INTVL_FOPT"]), derived.vector_names());
        assert_eq!(array![1.0, 2.0, 0.0], derived.column("AVG_FOPT").unwrap());
        assert_eq!(array![7.0, 8.0, 9.0], derived.column("FPR").unwrap());
        assert_eq!(array![10.0, 20.0, 0.0], derived.column("INTVL_FOPT").unwrap());

        let result = get_vectors_with_derived(&provider, &names(&["AVG_FGPT"]), None, None);
        assert!(matches!(result, Err(SummaryError::UnknownVector { .. })));
    }
}
