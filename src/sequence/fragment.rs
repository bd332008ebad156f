use once_cell::sync::Lazy;
use regex::Regex;

use super::{Orientation, Sequence};

// Collapsed read headers end in the merge count, separated by '_' or '-':
// `SAMPLE1_GENE_123432_2082`, `132-2082`, `GENE-88772-2082`.
static MULTIPLICITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".+[_\-](\d+)$").expect("static regex is valid"));

/// Parse the collapsed-read multiplicity from a read header.
///
/// Headers without a trailing count, or with a count that does not fit in a
/// `u32`, have multiplicity 1.
pub fn parse_multiplicity(name: &str) -> u32 {
    MULTIPLICITY
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().parse::<u32>().ok())
        .unwrap_or(1)
}

/// A single sequenced read decomposed against an edit base.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Read identifier from the input record.
    pub name: String,
    /// Collapsed-read multiplicity parsed from the name.
    pub read_count: u32,
    /// Normalised abundance (`scale × read_count`).
    pub norm: f64,
    sequence: Sequence,
}

impl Fragment {
    /// Decompose a raw read and derive its multiplicity and abundance.
    pub fn new(
        name: impl Into<String>,
        raw: &[u8],
        orientation: Orientation,
        edit_base: u8,
        norm_scale: f64,
    ) -> Self {
        let name = name.into();
        let read_count = parse_multiplicity(&name);
        Self {
            norm: norm_scale * read_count as f64,
            read_count,
            sequence: Sequence::decompose(raw, edit_base, orientation),
            name,
        }
    }

    /// Assemble a fragment from already decomposed parts.
    pub fn from_sequence(name: impl Into<String>, read_count: u32, norm: f64, sequence: Sequence) -> Self {
        Self {
            name: name.into(),
            read_count,
            norm,
            sequence,
        }
    }

    /// Decomposed sequence.
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Render as a FASTA record.
    pub fn to_fasta(&self) -> String {
        format!(">{}\n{}", self.name, self.sequence.render())
    }
}
