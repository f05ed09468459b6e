use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;

use crate::arrow_io::{write_summary_file, RealizationSummary};
use crate::frequency::{add_periods, Frequency};
use crate::providers::VectorMetadata;
use crate::table::TimeSeriesTable;

/// Midnight on a calendar date.
pub(crate) fn datetime(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Cumulative vectors of the monthly ensemble fixture.
pub(crate) const MONTHLY_VECTORS: [&str; 3] = ["FOPT", "WOPT:OP_1", "GOPT:OP"];

/// Monthly data for 10 realizations in each of 4 ensembles `iter-0` to `iter-3`, from
/// 2000-01-01 to 2003-02-01.
///
/// Every vector is a strictly increasing cumulative series, different for each ensemble,
/// realization and vector.
pub(crate) fn monthly_ensemble_table() -> TimeSeriesTable {
    let months: Vec<NaiveDateTime> = (0..38)
        .map(|month| add_periods(datetime(2000, 1, 1), Frequency::Monthly, month))
        .collect();
    let mut dates = Vec::new();
    let mut reals = Vec::new();
    let mut ensembles = Vec::new();
    let mut values = Vec::new();
    for ensemble in 0..4 {
        for real in 0..10 {
            for (month, date) in months.iter().enumerate() {
                dates.push(*date);
                reals.push(real);
                ensembles.push(format!("iter-{}", ensemble));
                for vector in 0..MONTHLY_VECTORS.len() {
                    let rate = 100.0 * (vector + 1) as f64 + 10.0 * real as f64 + ensemble as f64;
                    let month = month as f64;
                    values.push(rate * month + month * month);
                }
            }
        }
    }
    let values = Array2::from_shape_vec((dates.len(), MONTHLY_VECTORS.len()), values).unwrap();
    TimeSeriesTable::new(
        dates,
        reals,
        MONTHLY_VECTORS.iter().map(|v| v.to_string()).collect(),
        values,
    )
    .unwrap()
    .with_ensembles(ensembles)
    .unwrap()
}

/// Irregularly sampled raw data of one realization.
///
/// Dates run from 2000-01-01 to 2000-04-01. `FOPT` is a total, `FOPR` a rate and `FZERO` is
/// zero throughout. Metadata is present for `FOPT` and `FOPR` only.
pub(crate) fn raw_realization_summary(real: i32) -> RealizationSummary {
    let dates = vec![
        datetime(2000, 1, 1),
        datetime(2000, 1, 20),
        datetime(2000, 2, 15),
        datetime(2000, 3, 10),
        datetime(2000, 4, 1),
    ];
    let scale = f64::from(real + 1);
    let mut values = Array2::zeros((dates.len(), 3));
    for (row, date) in dates.iter().enumerate() {
        let days = (*date - dates[0]).num_days() as f64;
        values[[row, 0]] = scale * 10.0 * days;
        values[[row, 1]] = scale * 10.0 + row as f64;
    }
    let table = TimeSeriesTable::new(
        dates.clone(),
        vec![real; dates.len()],
        vec!["FOPT".to_string(), "FOPR".to_string(), "FZERO".to_string()],
        values,
    )
    .unwrap();
    let metadata = HashMap::from([
        (
            "FOPT".to_string(),
            VectorMetadata {
                unit: "SM3".to_string(),
                ..VectorMetadata::from_vector_name("FOPT")
            },
        ),
        (
            "FOPR".to_string(),
            VectorMetadata {
                unit: "SM3/DAY".to_string(),
                ..VectorMetadata::from_vector_name("FOPR")
            },
        ),
    ]);
    RealizationSummary { table, metadata }
}

/// Write [raw_realization_summary] files in the usual ensemble layout.
///
/// Files are written to `<ens_path>/realization-<N>/iter-0/share/results/unsmry/summary.arrow`
/// for each realization, and the matching file pattern relative to a realization is returned
/// along with the written paths.
pub(crate) fn write_realization_files(
    ens_path: &Path,
    realizations: &[i32],
) -> (String, Vec<PathBuf>) {
    let rel_dir = Path::new("share").join("results").join("unsmry");
    let mut paths = Vec::new();
    for &real in realizations {
        let dir = ens_path
            .join(format!("realization-{}", real))
            .join("iter-0")
            .join(&rel_dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("summary.arrow");
        let summary = raw_realization_summary(real);
        write_summary_file(&path, &summary.table, &summary.metadata).unwrap();
        paths.push(path);
    }
    ("share/results/unsmry/*.arrow".to_string(), paths)
}
