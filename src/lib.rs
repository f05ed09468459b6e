//! This crate provides ensemble summary providers: uniform, cached access to the summary time
//! series of an ensemble of reservoir simulation realizations.
//!
//! Per-realization summary files are combined into one table per ensemble, stored once in a
//! content-addressed backing store, and served through the
//! [EnsembleSummaryProvider](providers::EnsembleSummaryProvider) trait. Providers resample to
//! calendar frequencies on demand or serve data presampled at build time, and can be composed
//! into the difference of two ensembles. Cumulative vectors can be converted to interval deltas
//! and average daily rates.
//!
//! The crate is built on top of a number of open source components.
//!
//! * [Arrow](arrow) IPC files hold the per-realization input and the backing store tables.
//! * [ndarray] provides the value matrices used in numerical computation.
//! * [Rayon](rayon) parses and resamples realizations in parallel.
//! * [Serde](serde) performs (de)serialisation of manifests and vector metadata.

pub mod arrow_io;
pub mod backing_store;
pub mod cli;
pub mod cumulatives;
pub mod error;
pub mod factory;
pub mod frequency;
pub mod metrics;
pub mod naming;
pub mod providers;
pub mod resampling;
pub mod table;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
