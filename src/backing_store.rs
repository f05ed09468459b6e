//! Disk-backed store of provider data, addressed by a content hash.
//!
//! Each entry lives in `<root>/<kind>/<storage_key>/` and holds the serialised table
//! (`summary.arrow`) and a `manifest.json`. Entries are written into a uniquely named temporary
//! directory and published with a single directory rename, so readers never observe a partially
//! written entry. When two writers race, the first rename wins and the loser discards its copy.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::arrow_io;
use crate::error::SummaryError;
use crate::frequency::Frequency;
use crate::metrics::BACKING_STORE_LOOKUPS;
use crate::providers::VectorMetadata;
use crate::table::TimeSeriesTable;

const MANIFEST_FILE: &str = "manifest.json";
const TABLE_FILE: &str = "summary.arrow";
/// Version of the entry layout, bumped on incompatible changes
pub const FORMAT_VERSION: u32 = 1;

/// Returns the storage key for a set of construction parameters.
///
/// The key is the MD5 digest of the parameters joined with `__`. It addresses data, it is not a
/// security measure.
pub fn storage_key(parts: &[&str]) -> String {
    format!("{:x}", md5::compute(parts.join("__")))
}

/// Description of a stored entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Manifest {
    /// Entry layout version
    pub format_version: u32,
    /// Provider kind the entry was built for
    pub kind: String,
    /// Storage key of the entry
    pub storage_key: String,
    /// Sampling frequency of the stored table, `None` for raw data
    pub frequency: Option<Frequency>,
    /// Realizations in the stored table
    pub realizations: Vec<i32>,
    /// Vectors in the stored table
    pub vector_names: Vec<String>,
    /// Source files the entry was built from
    pub source_files: Vec<PathBuf>,
    /// Time the entry was built
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    /// Return a new Manifest describing `table`.
    pub fn new(
        kind: &str,
        storage_key: &str,
        frequency: Option<Frequency>,
        table: &TimeSeriesTable,
        source_files: Vec<PathBuf>,
    ) -> Self {
        Manifest {
            format_version: FORMAT_VERSION,
            kind: kind.to_string(),
            storage_key: storage_key.to_string(),
            frequency,
            realizations: table.realizations(),
            vector_names: table.vector_names().to_vec(),
            source_files,
            created_at: Utc::now(),
        }
    }
}

/// A stored entry read back from disk.
#[derive(Debug)]
pub struct StoreEntry {
    pub manifest: Manifest,
    pub table: TimeSeriesTable,
    pub metadata: HashMap<String, VectorMetadata>,
}

/// Backing store rooted at a directory.
#[derive(Clone, Debug)]
pub struct BackingStore {
    root: PathBuf,
}

impl BackingStore {
    /// Returns a new BackingStore. The root directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, kind: &str, storage_key: &str) -> PathBuf {
        self.root.join(kind).join(storage_key)
    }

    /// Path of the manifest of an entry, whether or not it exists.
    pub fn manifest_path(&self, kind: &str, storage_key: &str) -> PathBuf {
        self.entry_dir(kind, storage_key).join(MANIFEST_FILE)
    }

    /// Whether a complete entry exists.
    pub fn exists(&self, kind: &str, storage_key: &str) -> bool {
        self.manifest_path(kind, storage_key).is_file()
    }

    /// Read an entry, `None` if it does not exist.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn read(&self, kind: &str, storage_key: &str) -> Result<Option<StoreEntry>, SummaryError> {
        if !self.exists(kind, storage_key) {
            BACKING_STORE_LOOKUPS.with_label_values(&[kind, "miss"]).inc();
            return Ok(None);
        }
        BACKING_STORE_LOOKUPS.with_label_values(&[kind, "hit"]).inc();

        let manifest_path = self.manifest_path(kind, storage_key);
        let file = File::open(&manifest_path).map_err(|err| SummaryError::io(&manifest_path, err))?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
        let summary =
            arrow_io::read_summary_file(&self.entry_dir(kind, storage_key).join(TABLE_FILE), None)?;
        Ok(Some(StoreEntry {
            manifest,
            table: summary.table,
            metadata: summary.metadata,
        }))
    }

    /// Write an entry.
    ///
    /// Writing an entry that already exists leaves the existing entry in place.
    ///
    /// # Arguments
    ///
    /// * `kind`: Provider kind, one directory per kind
    /// * `storage_key`: Entry key
    /// * `table`: Table to store
    /// * `metadata`: Vector metadata to store with the table
    /// * `manifest`: Entry manifest, written last
    #[tracing::instrument(level = "DEBUG", skip(self, table, metadata, manifest))]
    pub fn write(
        &self,
        kind: &str,
        storage_key: &str,
        table: &TimeSeriesTable,
        metadata: &HashMap<String, VectorMetadata>,
        manifest: &Manifest,
    ) -> Result<(), SummaryError> {
        let kind_dir = self.root.join(kind);
        fs::create_dir_all(&kind_dir).map_err(|err| SummaryError::io(&kind_dir, err))?;
        let tmp_dir = kind_dir.join(format!(".{}.tmp-{}", storage_key, Uuid::new_v4()));
        fs::create_dir(&tmp_dir).map_err(|err| SummaryError::io(&tmp_dir, err))?;

        let result = write_entry_files(&tmp_dir, table, metadata, manifest)
            .and_then(|_| self.publish(&tmp_dir, kind, storage_key));
        if tmp_dir.exists() {
            // Either the write failed or another writer published first.
            let _ = fs::remove_dir_all(&tmp_dir);
        }
        result
    }

    fn publish(&self, tmp_dir: &Path, kind: &str, storage_key: &str) -> Result<(), SummaryError> {
        let entry_dir = self.entry_dir(kind, storage_key);
        if self.exists(kind, storage_key) {
            debug!(storage_key, "entry already published by another writer");
            return Ok(());
        }
        if entry_dir.exists() {
            // Left behind without a manifest, never a published entry. Moved aside first so a
            // concurrent writer never sees it half removed.
            let stale_dir = self
                .root
                .join(kind)
                .join(format!(".{}.stale-{}", storage_key, Uuid::new_v4()));
            match fs::rename(&entry_dir, &stale_dir) {
                Ok(()) => {
                    fs::remove_dir_all(&stale_dir).map_err(|err| SummaryError::io(&stale_dir, err))?
                }
                // Already moved by another writer.
                Err(_) if !entry_dir.exists() => (),
                Err(err) => return Err(SummaryError::io(&entry_dir, err)),
            }
        }
        match fs::rename(tmp_dir, &entry_dir) {
            Ok(()) => {
                info!(storage_key, kind, "published backing store entry");
                Ok(())
            }
            Err(_) if self.exists(kind, storage_key) => {
                debug!(storage_key, "lost publish race, keeping the existing entry");
                Ok(())
            }
            Err(err) => Err(SummaryError::io(&entry_dir, err)),
        }
    }
}

fn write_entry_files(
    dir: &Path,
    table: &TimeSeriesTable,
    metadata: &HashMap<String, VectorMetadata>,
    manifest: &Manifest,
) -> Result<(), SummaryError> {
    arrow_io::write_summary_file(&dir.join(TABLE_FILE), table, metadata)?;
    write_manifest(&dir.join(MANIFEST_FILE), manifest)
}

/// Write a manifest and sync it to disk.
fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), SummaryError> {
    let file = File::create(path).map_err(|err| SummaryError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest)?;
    writer.flush().map_err(|err| SummaryError::io(path, err))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|err| SummaryError::io(path, err))
}
