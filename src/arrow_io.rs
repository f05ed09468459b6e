//! Reading and writing summary tables as Arrow IPC files.
//!
//! A summary file has a `DATE` column, optionally a `REAL` column, and one numeric column per
//! vector. Vector metadata is stored as JSON in the field metadata under [SMRY_META_KEY].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, TimestampMillisecondArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use ndarray::Array2;
use tracing::debug;

use crate::error::SummaryError;
use crate::providers::VectorMetadata;
use crate::table::{TimeSeriesTable, DATE_COLUMN, REAL_COLUMN};

/// Field metadata key holding a JSON encoded [VectorMetadata]
pub const SMRY_META_KEY: &str = "smry_meta";

/// Summary data of a single realization.
#[derive(Clone, Debug)]
pub struct RealizationSummary {
    /// Table with all rows belonging to one realization
    pub table: TimeSeriesTable,
    /// Metadata found in the file, keyed by vector name
    pub metadata: HashMap<String, VectorMetadata>,
}

fn invalid(path: &Path, reason: &str) -> SummaryError {
    SummaryError::InvalidTable {
        reason: format!("{}: {}", path.display(), reason),
    }
}

fn read_batch(path: &Path) -> Result<RecordBatch, SummaryError> {
    let file = File::open(path).map_err(|err| SummaryError::io(path, err))?;
    let reader = FileReader::try_new(BufReader::new(file), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

fn read_dates(path: &Path, batch: &RecordBatch) -> Result<Vec<NaiveDateTime>, SummaryError> {
    let column = batch
        .column_by_name(DATE_COLUMN)
        .ok_or_else(|| invalid(path, "missing DATE column"))?;
    let column = cast(column, &DataType::Timestamp(TimeUnit::Millisecond, None))?;
    let column = column
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| invalid(path, "DATE column is not a timestamp"))?;
    column
        .iter()
        .map(|millis| {
            millis
                .and_then(DateTime::from_timestamp_millis)
                .map(|date| date.naive_utc())
                .ok_or_else(|| invalid(path, "null or out of range DATE"))
        })
        .collect()
}

fn read_reals(path: &Path, batch: &RecordBatch) -> Result<Vec<i32>, SummaryError> {
    let column = batch
        .column_by_name(REAL_COLUMN)
        .ok_or_else(|| invalid(path, "missing REAL column"))?;
    let column = cast(column, &DataType::Int32)?;
    let column = column
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| invalid(path, "REAL column is not an integer"))?;
    column
        .iter()
        .map(|real| real.ok_or_else(|| invalid(path, "null REAL")))
        .collect()
}

/// Read a summary file.
///
/// # Arguments
///
/// * `path`: Arrow IPC file
/// * `realization`: Realization of every row. If `None`, the file must have a `REAL` column.
pub fn read_summary_file(
    path: &Path,
    realization: Option<i32>,
) -> Result<RealizationSummary, SummaryError> {
    let batch = read_batch(path)?;
    let dates = read_dates(path, &batch)?;
    let reals = match realization {
        Some(real) => vec![real; dates.len()],
        None => read_reals(path, &batch)?,
    };

    let schema = batch.schema();
    let mut vector_names = Vec::new();
    let mut columns = Vec::new();
    let mut metadata = HashMap::new();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name();
        if name == DATE_COLUMN || name == REAL_COLUMN {
            continue;
        }
        if !field.data_type().is_numeric() {
            debug!(column = name.as_str(), "skipping non-numeric column");
            continue;
        }
        let column = cast(column, &DataType::Float64)?;
        let column = column
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| invalid(path, "numeric column did not cast to f64"))?;
        columns.push(
            column
                .iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect::<Vec<f64>>(),
        );
        if let Some(json) = field.metadata().get(SMRY_META_KEY) {
            let meta: VectorMetadata = serde_json::from_str(json)?;
            metadata.insert(name.clone(), meta);
        }
        vector_names.push(name.clone());
    }

    let mut values = Array2::zeros((dates.len(), vector_names.len()));
    for (index, column) in columns.into_iter().enumerate() {
        values
            .column_mut(index)
            .assign(&ndarray::Array1::from(column));
    }
    let table = TimeSeriesTable::new(dates, reals, vector_names, values)?.sorted_by_real_and_date();
    table.validate()?;
    Ok(RealizationSummary { table, metadata })
}

/// Write a table with `DATE`, `REAL` and vector columns.
///
/// # Arguments
///
/// * `path`: Destination file, created or truncated
/// * `table`: Table to write
/// * `metadata`: Vector metadata, stored per field where present
pub fn write_summary_file(
    path: &Path,
    table: &TimeSeriesTable,
    metadata: &HashMap<String, VectorMetadata>,
) -> Result<(), SummaryError> {
    let mut fields = vec![
        Field::new(
            DATE_COLUMN,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new(REAL_COLUMN, DataType::Int32, false),
    ];
    let millis: Vec<i64> = table
        .dates()
        .iter()
        .map(|date| date.and_utc().timestamp_millis())
        .collect();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from(millis)),
        Arc::new(Int32Array::from(table.reals().to_vec())),
    ];
    for (name, column) in table.vector_names().iter().zip(table.values().columns()) {
        let mut field = Field::new(name, DataType::Float64, false);
        if let Some(meta) = metadata.get(name) {
            let field_metadata =
                HashMap::from([(SMRY_META_KEY.to_string(), serde_json::to_string(meta)?)]);
            field = field.with_metadata(field_metadata);
        }
        fields.push(field);
        columns.push(Arc::new(Float64Array::from(column.to_vec())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = File::create(path).map_err(|err| SummaryError::io(path, err))?;
    let mut writer = FileWriter::try_new(BufWriter::new(file), &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}
