//! # RNA editing classification and storage
//!
//! Quantifies the editing state of individual sequenced fragments against a
//! curated multi-variant reference, then stores and queries millions of
//! such classifications in an embedded ordered key-value store.
//!
//! ## Pipeline
//!
//! 1. **Decompose**: split reads into a backbone plus per-site edit-base counts
//! 2. **Template**: combine fully edited, pre-edited and alternative variants
//!    that share one backbone
//! 3. **Classify**: align a fragment to the template and locate where full
//!    editing stops, where pre-editing begins and whether an alternative
//!    pattern explains the junction
//! 4. **Store**: encode records big-endian and commit them in batches under
//!    `gene / sample / replicate / id` keys
//! 5. **Query**: prefix-scan and filter alignments in key order
//!
//! ## Usage Example
//!
//! ```no_run
//! use treat::query::SearchFields;
//! use treat::storage::{load_sample, LoadConfig, Storage};
//!
//! # fn main() -> Result<(), treat::storage::StoreError> {
//! let config = LoadConfig::default();
//! let template = config.template("ND7", vec![("fe", "TTACGT"), ("pe", "ACG")])?;
//!
//! let mut store = Storage::open("treat.db")?;
//! store.put_template("ND7", &template)?;
//! let reads = vec![config.fragment("read_12", b"TTACGT")];
//! load_sample(&mut store, "ND7", "wt", reads, &config, None)?;
//!
//! store.search(&SearchFields::for_gene("ND7"), |key, aln| {
//!     println!("{key} edit_stop={} junc_len={}", aln.edit_stop, aln.junc_len);
//! })?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod classify; // Editing classifier and alignment view
pub mod codec; // Big-endian record encoding
pub mod query; // Search predicates and aggregates
pub mod sequence; // Backbone / edit-site model
pub mod storage; // Embedded ordered store and loader
pub mod template; // Multi-variant gene references

pub use classify::{classify, classify_with, Alignment, AlignmentView, ClassifyError};
pub use codec::{CodecError, Record};
pub use query::{QueryError, SearchFields};
pub use sequence::{Fragment, Orientation, Sequence};
pub use storage::{load_sample, try_load_sample, AlignmentKey, LoadConfig, Storage, StoreError};
pub use template::{AltRegion, GuideRna, Template, TemplateError};
