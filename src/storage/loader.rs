//! Batched single-writer loading of one sample.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{check_name, Storage, StoreError, StoreResult};
use crate::classify::{classify, Alignment};
use crate::sequence::{Fragment, Orientation};
use crate::template::Template;

/// Load settings that cannot produce a load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Batches must hold at least one record.
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    /// `norm` would be NaN, infinite or negative.
    #[error("norm scale must be finite and non-negative, got {0}")]
    InvalidNormScale(f64),

    /// Edit bases are nucleotide letters.
    #[error("edit base must be a letter, got {0:?}")]
    InvalidEditBase(char),
}

/// Configuration for loading templates and samples.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    /// Records per committed transaction.
    pub batch_size: usize,
    /// Replicate number recorded for the sample.
    pub replicate: u8,
    /// Scale factor applied to read counts to obtain `norm`.
    pub norm_scale: f64,
    /// Orientation of fragment reads; templates are always read forward.
    pub orientation: Orientation,
    /// Edit base counted at edit sites.
    pub edit_base: u8,
    /// Optional 5′ primer trimmed from the junction-end scan.
    pub primer5: Option<String>,
    /// Optional 3′ primer trimmed from the junction-start scan.
    pub primer3: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            replicate: 1,
            norm_scale: 1.0,
            orientation: Orientation::Forward,
            edit_base: b'T',
            primer5: None,
            primer3: None,
        }
    }
}

impl LoadConfig {
    /// Set the number of records per transaction.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the replicate number.
    pub fn with_replicate(mut self, replicate: u8) -> Self {
        self.replicate = replicate;
        self
    }

    /// Set the normalisation scale factor.
    pub fn with_norm_scale(mut self, norm_scale: f64) -> Self {
        self.norm_scale = norm_scale;
        self
    }

    /// Set the read orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the edit base.
    pub fn with_edit_base(mut self, edit_base: u8) -> Self {
        self.edit_base = edit_base.to_ascii_uppercase();
        self
    }

    /// Set primers trimmed from the boundary scans.
    pub fn with_primers(mut self, primer5: Option<String>, primer3: Option<String>) -> Self {
        self.primer5 = primer5;
        self.primer3 = primer3;
        self
    }

    /// Reject settings that cannot produce a load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if !self.norm_scale.is_finite() || self.norm_scale < 0.0 {
            return Err(ConfigError::InvalidNormScale(self.norm_scale));
        }
        if !self.edit_base.is_ascii_alphabetic() {
            return Err(ConfigError::InvalidEditBase(self.edit_base as char));
        }
        Ok(())
    }

    /// Decompose a raw read with this configuration.
    pub fn fragment(&self, name: impl Into<String>, raw: &[u8]) -> Fragment {
        Fragment::new(name, raw, self.orientation, self.edit_base, self.norm_scale)
    }

    /// Build a gene's template from ordered records and apply the primers.
    pub fn template<I, S, Q>(&self, gene: &str, records: I) -> StoreResult<Template>
    where
        I: IntoIterator<Item = (S, Q)>,
        S: AsRef<str>,
        Q: AsRef<[u8]>,
    {
        let with_gene = |source| StoreError::Template {
            gene: gene.to_string(),
            source,
        };
        let mut template =
            Template::from_records(records, self.edit_base, Orientation::Forward).map_err(with_gene)?;
        if let Some(primer) = &self.primer5 {
            template.set_primer5(primer).map_err(with_gene)?;
        }
        if let Some(primer) = &self.primer3 {
            template.set_primer3(primer).map_err(with_gene)?;
        }
        Ok(template)
    }
}

/// Cooperative cancellation flag checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    /// Transactions committed.
    pub batches: usize,
    /// Records stored.
    pub records: u64,
}

/// Classify and store every fragment of one sample.
///
/// The gene must already have a template. The (gene, sample) namespace is
/// created first and must not exist. Fragments are committed in batches of
/// `config.batch_size`; a failure or cancellation leaves every earlier
/// batch in place.
pub fn load_sample<I>(
    storage: &mut Storage,
    gene: &str,
    sample: &str,
    fragments: I,
    config: &LoadConfig,
    cancel: Option<&CancelToken>,
) -> StoreResult<LoadSummary>
where
    I: IntoIterator<Item = Fragment>,
{
    try_load_sample(
        storage,
        gene,
        sample,
        fragments.into_iter().map(Ok::<_, Infallible>),
        config,
        cancel,
    )
}

/// [`load_sample`] over a fallible fragment stream such as a FASTA reader.
///
/// The first `Err` stops the load; batches committed before it stay.
pub fn try_load_sample<I, E>(
    storage: &mut Storage,
    gene: &str,
    sample: &str,
    fragments: I,
    config: &LoadConfig,
    cancel: Option<&CancelToken>,
) -> StoreResult<LoadSummary>
where
    I: IntoIterator<Item = Result<Fragment, E>>,
    E: Into<StoreError>,
{
    config.validate()?;
    check_name("gene", gene)?;
    check_name("sample", sample)?;
    let batch_size = config.batch_size;
    let template = storage.require_template(gene)?;
    storage.create_namespace(gene, sample, config.replicate)?;
    info!(gene, sample, replicate = config.replicate, batch_size, "loading sample");

    let mut summary = LoadSummary::default();
    let mut batch = Vec::with_capacity(batch_size);
    let mut fragments = fragments.into_iter().peekable();

    while let Some(fragment) = fragments.next() {
        let fragment = fragment.map_err(|err| -> StoreError { err.into() })?;
        let alignment = classify(&fragment, &template)?;
        batch.push((alignment, fragment));
        if batch.len() < batch_size {
            continue;
        }

        commit(storage, gene, sample, config.replicate, &mut batch, &mut summary)?;
        if fragments.peek().is_some() && cancel.map_or(false, CancelToken::is_cancelled) {
            warn!(gene, sample, committed = summary.records, "load cancelled");
            return Err(StoreError::Cancelled {
                committed: summary.records,
            });
        }
    }
    if !batch.is_empty() {
        commit(storage, gene, sample, config.replicate, &mut batch, &mut summary)?;
    }

    info!(gene, sample, batches = summary.batches, records = summary.records, "sample loaded");
    Ok(summary)
}

fn commit(
    storage: &mut Storage,
    gene: &str,
    sample: &str,
    replicate: u8,
    batch: &mut Vec<(Alignment, Fragment)>,
    summary: &mut LoadSummary,
) -> StoreResult<()> {
    let last_id = storage.insert_batch(gene, sample, replicate, batch)?;
    summary.batches += 1;
    summary.records += batch.len() as u64;
    debug!(gene, sample, batch = summary.batches, records = batch.len(), last_id, "committed batch");
    batch.clear();
    Ok(())
}
