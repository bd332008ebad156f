//! Embedded store for templates, alignments and fragments.
//!
//! The store is a SQLite file whose tables are used as ordered byte-key
//! maps: every table is `WITHOUT ROWID` with a BLOB primary key, so rows
//! come back in raw byte order and a prefix scan is a range seek.
//!
//! | table        | key                       | value                 |
//! | ------------ | ------------------------- | --------------------- |
//! | `templates`  | gene                      | encoded [`Template`]  |
//! | `namespaces` | `gene 0 sample 0`         | replicate             |
//! | `sequences`  | `gene 0 sample 0`         | last issued id        |
//! | `alignments` | [`AlignmentKey`]          | encoded [`Alignment`] |
//! | `fragments`  | [`AlignmentKey`]          | encoded [`Fragment`]  |
//!
//! A single [`Storage`] is the only writer. Readers open their own handle;
//! every read runs inside one transaction so it sees whole batches only.

pub mod key;
mod loader;

pub use key::AlignmentKey;
pub use loader::{load_sample, try_load_sample, CancelToken, ConfigError, LoadConfig, LoadSummary};

use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use crate::classify::{Alignment, ClassifyError};
use crate::codec::{CodecError, Record};
use crate::query::{GeneTable, QueryError};
use crate::sequence::Fragment;
use crate::template::{Template, TemplateError};

/// Errors raised by the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure; never retried.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored record or key failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Query parameters were rejected.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Load settings were rejected before anything was written.
    #[error("invalid load configuration: {0}")]
    Config(#[from] ConfigError),

    /// The fragment input failed while loading.
    #[error("failed to read fragment input: {0}")]
    Input(#[from] std::io::Error),

    /// A fragment could not be classified.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The (gene, sample) namespace was already loaded.
    #[error("sample {sample} of gene {gene} is already loaded; reload the store or clear the sample first")]
    NamespaceExists {
        /// Gene name.
        gene: String,
        /// Sample name.
        sample: String,
    },

    /// A different template is already stored for the gene.
    #[error("gene {0} already has a different template")]
    TemplateConflict(String),

    /// No template is stored for the gene.
    #[error("gene {0} not found")]
    UnknownGene(String),

    /// Gene or sample name cannot be used in a key.
    #[error("invalid {kind} name {name:?}: names must be non-empty and free of NUL bytes")]
    InvalidName {
        /// `"gene"` or `"sample"`.
        kind: &'static str,
        /// Name as supplied.
        name: String,
    },

    /// Template input for a gene was rejected.
    #[error("invalid template for gene {gene}: {source}")]
    Template {
        /// Gene being configured.
        gene: String,
        /// Underlying configuration error.
        #[source]
        source: TemplateError,
    },

    /// A load stopped at a batch boundary on request.
    #[error("load cancelled after {committed} committed records")]
    Cancelled {
        /// Records durably committed before stopping.
        committed: u64,
    },
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<Infallible> for StoreError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS templates (
        gene BLOB PRIMARY KEY,
        data BLOB NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS namespaces (
        ns BLOB PRIMARY KEY,
        replicate INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS sequences (
        ns BLOB PRIMARY KEY,
        last_id INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS alignments (
        key BLOB PRIMARY KEY,
        data BLOB NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS fragments (
        key BLOB PRIMARY KEY,
        data BLOB NOT NULL
    ) WITHOUT ROWID;
";

/// One loaded sample of a gene.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SampleEntry {
    /// Sample name.
    pub sample: String,
    /// Replicate number recorded at load time.
    pub replicate: u8,
}

/// Handle on an alignment store.
#[derive(Debug)]
pub struct Storage {
    connection: Connection,
}

pub(crate) fn check_name(kind: &'static str, name: &str) -> StoreResult<()> {
    if key::is_valid_name(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

impl Storage {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let connection = Connection::open(path.as_ref())?;
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(connection)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> StoreResult<Self> {
        connection.busy_timeout(Duration::from_secs(1))?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self { connection })
    }

    /// Store the template for `gene`.
    ///
    /// Storing an identical template again is a no-op; a different one is a
    /// [`StoreError::TemplateConflict`].
    pub fn put_template(&mut self, gene: &str, template: &Template) -> StoreResult<()> {
        check_name("gene", gene)?;
        let data = template.encode()?;

        let tx = self.connection.transaction()?;
        let existing: Option<Vec<u8>> = tx
            .query_row("SELECT data FROM templates WHERE gene = ?1", [gene.as_bytes()], |row| row.get(0))
            .optional()?;
        match existing {
            Some(stored) if stored == data => return Ok(()),
            Some(_) => return Err(StoreError::TemplateConflict(gene.to_string())),
            None => {
                tx.execute("INSERT INTO templates(gene, data) VALUES (?1, ?2)", (gene.as_bytes(), &data))?;
            }
        }
        tx.commit()?;

        info!(gene, variants = template.size(), "registered template");
        Ok(())
    }

    /// Template for `gene`, if one is stored.
    pub fn template(&self, gene: &str) -> StoreResult<Option<Template>> {
        let data: Option<Vec<u8>> = self
            .connection
            .query_row("SELECT data FROM templates WHERE gene = ?1", [gene.as_bytes()], |row| row.get(0))
            .optional()?;
        Ok(data.map(|bytes| Template::decode(&bytes)).transpose()?)
    }

    pub(crate) fn require_template(&self, gene: &str) -> StoreResult<Template> {
        self.template(gene)?
            .ok_or_else(|| StoreError::UnknownGene(gene.to_string()))
    }

    /// Names of every gene with a stored template, in byte order.
    pub fn genes(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.connection.prepare("SELECT gene FROM templates ORDER BY gene")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        rows.map(|gene| -> StoreResult<String> {
            let gene = gene?;
            String::from_utf8(gene)
                .map_err(|_| CodecError::InvalidKey("gene is not UTF-8".into()).into())
        })
        .collect()
    }

    /// Decode every stored template into a lookup table.
    pub fn gene_table(&self) -> StoreResult<GeneTable> {
        let tx = self.connection.unchecked_transaction()?;
        let mut stmt = tx.prepare("SELECT gene, data FROM templates ORDER BY gene")?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let gene: Vec<u8> = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            let gene = String::from_utf8(gene)
                .map_err(|_| CodecError::InvalidKey("gene is not UTF-8".into()))?;
            entries.push((gene, Template::decode(&data)?));
        }
        Ok(GeneTable::from_entries(entries))
    }

    /// Samples loaded for `gene`.
    pub fn samples(&self, gene: &str) -> StoreResult<Vec<SampleEntry>> {
        self.require_template(gene)?;
        let prefix = key::gene_prefix(gene)?;
        let mut stmt = self
            .connection
            .prepare("SELECT ns, replicate FROM namespaces WHERE ns >= ?1 ORDER BY ns")?;
        let mut rows = stmt.query([&prefix])?;
        let mut samples = Vec::new();
        while let Some(row) = rows.next()? {
            let ns: Vec<u8> = row.get(0)?;
            if !ns.starts_with(&prefix) {
                break;
            }
            let sample = ns[prefix.len()..]
                .strip_suffix(&[0u8])
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .ok_or_else(|| CodecError::InvalidKey("malformed sample namespace".into()))?;
            samples.push(SampleEntry {
                sample: sample.to_string(),
                replicate: row.get(1)?,
            });
        }
        Ok(samples)
    }

    /// Create the (gene, sample) namespace, failing if it already exists.
    pub(crate) fn create_namespace(&mut self, gene: &str, sample: &str, replicate: u8) -> StoreResult<()> {
        check_name("gene", gene)?;
        check_name("sample", sample)?;
        let ns = key::sample_prefix(gene, sample)?;

        let tx = self.connection.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM namespaces WHERE ns = ?1", [&ns], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(StoreError::NamespaceExists {
                gene: gene.to_string(),
                sample: sample.to_string(),
            });
        }
        tx.execute("INSERT INTO namespaces(ns, replicate) VALUES (?1, ?2)", (&ns, replicate))?;
        tx.commit()?;

        info!(gene, sample, replicate, "created sample namespace");
        Ok(())
    }

    /// Insert one batch atomically, issuing ids after the namespace's last id.
    ///
    /// Returns the last id issued.
    pub(crate) fn insert_batch(
        &mut self,
        gene: &str,
        sample: &str,
        replicate: u8,
        records: &[(Alignment, Fragment)],
    ) -> StoreResult<u64> {
        let ns = key::sample_prefix(gene, sample)?;
        let tx = self.connection.transaction()?;

        let last: Option<i64> = tx
            .query_row("SELECT last_id FROM sequences WHERE ns = ?1", [&ns], |row| row.get(0))
            .optional()?;
        let mut id = last.unwrap_or(0) as u64;
        {
            let mut put_alignment = tx.prepare_cached("INSERT INTO alignments(key, data) VALUES (?1, ?2)")?;
            let mut put_fragment = tx.prepare_cached("INSERT INTO fragments(key, data) VALUES (?1, ?2)")?;
            for (alignment, fragment) in records {
                id += 1;
                let key = AlignmentKey {
                    gene: gene.to_string(),
                    sample: sample.to_string(),
                    replicate,
                    id,
                }
                .encode()?;
                put_alignment.execute((&key, alignment.encode()?))?;
                put_fragment.execute((&key, fragment.encode()?))?;
            }
        }
        let stored = i64::try_from(id).map_err(|_| CodecError::FieldOverflow {
            field: "sequence id",
            len: id as usize,
        })?;
        tx.execute(
            "INSERT INTO sequences(ns, last_id) VALUES (?1, ?2)
             ON CONFLICT(ns) DO UPDATE SET last_id = excluded.last_id",
            (&ns, stored),
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Alignment stored under `key`.
    pub fn alignment(&self, key: &AlignmentKey) -> StoreResult<Option<Alignment>> {
        self.get("alignments", key)
    }

    /// Fragment stored under `key`.
    pub fn fragment(&self, key: &AlignmentKey) -> StoreResult<Option<Fragment>> {
        self.get("fragments", key)
    }

    fn get<R: Record>(&self, table: &str, key: &AlignmentKey) -> StoreResult<Option<R>> {
        let sql = format!("SELECT data FROM {table} WHERE key = ?1");
        let data: Option<Vec<u8>> = self
            .connection
            .query_row(&sql, [key.encode()?], |row| row.get(0))
            .optional()?;
        Ok(data.map(|bytes| R::decode(&bytes)).transpose()?)
    }

    /// Remove a loaded sample so it can be loaded again.
    ///
    /// The id sequence is kept, so reloaded records never reuse an id.
    /// Returns the number of alignments removed.
    pub fn clear_sample(&mut self, gene: &str, sample: &str) -> StoreResult<usize> {
        check_name("gene", gene)?;
        check_name("sample", sample)?;
        let ns = key::sample_prefix(gene, sample)?;
        let mut upper = ns.clone();
        // ns ends in the 0x00 separator; bumping it bounds the range.
        if let Some(last) = upper.last_mut() {
            *last = 1;
        }

        let tx = self.connection.transaction()?;
        let removed = tx.execute("DELETE FROM alignments WHERE key >= ?1 AND key < ?2", (&ns, &upper))?;
        tx.execute("DELETE FROM fragments WHERE key >= ?1 AND key < ?2", (&ns, &upper))?;
        tx.execute("DELETE FROM namespaces WHERE ns = ?1", [&ns])?;
        tx.commit()?;

        info!(gene, sample, removed, "cleared sample");
        Ok(removed)
    }

    /// Visit `(key, value)` alignment rows whose key starts with `prefix`, in
    /// key order, until `visit` returns `Ok(false)`.
    pub(crate) fn scan_alignments<F>(&self, prefix: &[u8], mut visit: F) -> StoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> StoreResult<bool>,
    {
        let tx = self.connection.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached("SELECT key, data FROM alignments WHERE key >= ?1 ORDER BY key")?;
            let mut rows = stmt.query([prefix])?;
            let mut scanned = 0usize;
            while let Some(row) = rows.next()? {
                let key: Vec<u8> = row.get(0)?;
                if !key.starts_with(prefix) {
                    break;
                }
                scanned += 1;
                let data: Vec<u8> = row.get(1)?;
                if !visit(&key, &data)? {
                    break;
                }
            }
            debug!(scanned, "alignment scan finished");
        }
        tx.finish()?;
        Ok(())
    }
}
