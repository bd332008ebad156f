//! Streaming search over stored alignments.
//!
//! There is no secondary index: a search narrows the scan with a key
//! prefix, then filters every row in key order. Offset and limit count
//! surviving rows, so skipping `n` matches costs `n` decodes.

pub mod report;

pub use report::{GeneTable, Histogram, Metric, SampleTotals};

use thiserror::Error;

use crate::classify::Alignment;
use crate::codec::Record;
use crate::storage::key::{self, AlignmentKey};
use crate::storage::{Storage, StoreResult};

/// Errors raised while building a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Parameter name is not a search field.
    #[error("unknown search field '{0}'")]
    UnknownField(String),

    /// Parameter value could not be parsed.
    #[error("invalid value '{value}' for {field}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Value as supplied.
        value: String,
    },

    /// Gene or sample name cannot occur in a key.
    #[error("invalid {field} name {name:?}")]
    InvalidName {
        /// `"gene"` or `"sample"`.
        field: &'static str,
        /// Name as supplied.
        name: String,
    },

    /// The operation needs a gene.
    #[error("missing required field gene")]
    MissingGene,
}

/// Search predicates and pagination.
///
/// Every field defaults to "no filter", except the mutation toggle: with
/// `has_mutation = false` and `all = false` only non-mutant alignments match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFields {
    /// Gene to scan; `None` scans every gene.
    pub gene: Option<String>,
    /// Samples to keep; empty keeps all.
    pub samples: Vec<String>,
    /// Replicate to keep.
    pub replicate: Option<u8>,
    /// Exact edit stop site.
    pub edit_stop: Option<u64>,
    /// Exact junction end site.
    pub junc_end: Option<u64>,
    /// Select mutant (`true`) or non-mutant (`false`) alignments.
    pub has_mutation: bool,
    /// Keep alignments regardless of mutation status.
    pub all: bool,
    /// Keep only alignments with alternative editing.
    pub has_alt: bool,
    /// Guide indices that must all be set in the edit-stop mask.
    pub grna_edit: Vec<usize>,
    /// Guide indices that must all be set in the junction mask.
    pub grna_junc: Vec<usize>,
    /// Matches to skip before visiting.
    pub offset: usize,
    /// Maximum matches to visit; `None` is unlimited.
    pub limit: Option<usize>,
}

impl SearchFields {
    /// Fields selecting one gene.
    pub fn for_gene(gene: impl Into<String>) -> Self {
        Self {
            gene: Some(gene.into()),
            ..Self::default()
        }
    }

    /// Add a sample to the sample set.
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.samples.push(sample.into());
        self
    }

    /// Restrict to one replicate.
    pub fn with_replicate(mut self, replicate: u8) -> Self {
        self.replicate = Some(replicate);
        self
    }

    /// Keep every alignment regardless of mutation status.
    pub fn with_all(mut self) -> Self {
        self.all = true;
        self
    }

    /// Set pagination.
    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Parse `key=value` pairs as sent by a query string.
    ///
    /// `sample`, `grna_edit` and `grna_junc` may repeat; guide lists also
    /// accept comma-separated values.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut fields = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "gene" => fields.gene = Some(value.to_string()),
                "sample" => fields.samples.push(value.to_string()),
                "replicate" => fields.replicate = Some(parse(key, value)?),
                "edit_stop" => fields.edit_stop = Some(parse(key, value)?),
                "junc_end" => fields.junc_end = Some(parse(key, value)?),
                "has_mutation" => fields.has_mutation = parse_bool(key, value)?,
                "has_alt" => fields.has_alt = parse_bool(key, value)?,
                "all" => fields.all = parse_bool(key, value)?,
                "grna_edit" => fields.grna_edit.extend(parse_list(key, value)?),
                "grna_junc" => fields.grna_junc.extend(parse_list(key, value)?),
                "offset" => fields.offset = parse(key, value)?,
                "limit" => fields.limit = Some(parse(key, value)?),
                other => return Err(QueryError::UnknownField(other.to_string())),
            }
        }
        fields.validate()?;
        Ok(fields)
    }

    /// Check that names can occur in keys.
    pub fn validate(&self) -> Result<(), QueryError> {
        if let Some(gene) = &self.gene {
            if !key::is_valid_name(gene) {
                return Err(QueryError::InvalidName {
                    field: "gene",
                    name: gene.clone(),
                });
            }
        }
        if let Some(sample) = self.samples.iter().find(|s| !key::is_valid_name(s)) {
            return Err(QueryError::InvalidName {
                field: "sample",
                name: sample.clone(),
            });
        }
        Ok(())
    }

    /// Narrowest key prefix implied by gene, sample and replicate.
    pub fn scan_prefix(&self) -> Result<Vec<u8>, QueryError> {
        let Some(gene) = &self.gene else {
            return Ok(Vec::new());
        };
        let prefix = match (self.samples.as_slice(), self.replicate) {
            ([sample], Some(replicate)) => key::replicate_prefix(gene, sample, replicate),
            ([sample], None) => key::sample_prefix(gene, sample),
            _ => key::gene_prefix(gene),
        };
        prefix.map_err(|_| QueryError::InvalidName {
            field: "gene",
            name: gene.clone(),
        })
    }

    /// Key-level filter: sample set and replicate.
    pub fn matches_key(&self, key: &AlignmentKey) -> bool {
        if self.replicate.map_or(false, |r| r != key.replicate) {
            return false;
        }
        self.samples.is_empty() || self.samples.iter().any(|s| *s == key.sample)
    }

    /// Value-level filter.
    pub fn matches(&self, alignment: &Alignment) -> bool {
        if !self.all && alignment.has_mutation != self.has_mutation {
            return false;
        }
        if self.edit_stop.map_or(false, |v| v != alignment.edit_stop) {
            return false;
        }
        if self.junc_end.map_or(false, |v| v != alignment.junc_end) {
            return false;
        }
        if self.has_alt && alignment.alt_editing.is_none() {
            return false;
        }
        self.grna_edit.iter().all(|&g| alignment.has_guide_edit(g))
            && self.grna_junc.iter().all(|&g| alignment.has_guide_junc(g))
    }
}

fn parse<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, QueryError> {
    value.parse().map_err(|_| QueryError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, QueryError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "on" | "yes" => Ok(true),
        "0" | "f" | "false" | "off" | "no" => Ok(false),
        _ => Err(QueryError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_list(field: &str, value: &str) -> Result<Vec<usize>, QueryError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse(field, v))
        .collect()
}

impl Storage {
    /// Stream alignments matching `fields` to `visit` in key order.
    ///
    /// A gene with no stored template is [`StoreError::UnknownGene`], never
    /// an empty result. Returns the number of alignments visited.
    ///
    /// [`StoreError::UnknownGene`]: crate::storage::StoreError::UnknownGene
    pub fn search<F>(&self, fields: &SearchFields, mut visit: F) -> StoreResult<usize>
    where
        F: FnMut(&AlignmentKey, &Alignment),
    {
        fields.validate()?;
        if let Some(gene) = &fields.gene {
            self.require_template(gene)?;
        }
        let prefix = fields.scan_prefix()?;

        let (mut skipped, mut visited) = (0usize, 0usize);
        if fields.limit == Some(0) {
            return Ok(0);
        }
        self.scan_alignments(&prefix, |raw_key, raw_value| {
            let key = AlignmentKey::decode(raw_key)?;
            if !fields.matches_key(&key) {
                return Ok(true);
            }
            let alignment = Alignment::decode(raw_value)?;
            if !fields.matches(&alignment) {
                return Ok(true);
            }
            if skipped < fields.offset {
                skipped += 1;
                return Ok(true);
            }
            visit(&key, &alignment);
            visited += 1;
            Ok(fields.limit.map_or(true, |limit| visited < limit))
        })?;
        Ok(visited)
    }

    /// Number of alignments matching `fields`, ignoring pagination.
    pub fn count(&self, fields: &SearchFields) -> StoreResult<usize> {
        let unpaged = fields.clone().with_page(0, None);
        self.search(&unpaged, |_, _| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitvec::prelude::*;
    use test_case::test_case;

    fn alignment(has_mutation: bool) -> Alignment {
        Alignment {
            edit_stop: 7,
            junc_end: 12,
            has_mutation,
            grna_edit: bitvec![u8, Msb0; 1, 0, 1],
            grna_junc: bitvec![u8, Msb0; 0, 1],
            ..Alignment::default()
        }
    }

    #[test_case(&[("gene", "ND7"), ("sample", "a"), ("sample", "b")] ; "repeated samples")]
    #[test_case(&[("gene", "ND7"), ("grna_edit", "0,2"), ("all", "on")] ; "guide list")]
    #[test_case(&[("offset", "10"), ("limit", "5"), ("replicate", "2")] ; "pagination")]
    fn well_formed_pairs_parse(pairs: &[(&str, &str)]) {
        assert!(SearchFields::from_pairs(pairs.iter().copied()).is_ok());
    }

    #[test_case(&[("colour", "red")], QueryError::UnknownField("colour".into()) ; "unknown field")]
    #[test_case(&[("edit_stop", "-1")], QueryError::InvalidValue { field: "edit_stop".into(), value: "-1".into() } ; "negative site")]
    #[test_case(&[("replicate", "300")], QueryError::InvalidValue { field: "replicate".into(), value: "300".into() } ; "replicate overflow")]
    #[test_case(&[("has_alt", "maybe")], QueryError::InvalidValue { field: "has_alt".into(), value: "maybe".into() } ; "bad bool")]
    #[test_case(&[("sample", "")], QueryError::InvalidName { field: "sample", name: String::new() } ; "empty sample")]
    fn malformed_pairs_are_rejected(pairs: &[(&str, &str)], expected: QueryError) {
        assert_eq!(SearchFields::from_pairs(pairs.iter().copied()).unwrap_err(), expected);
    }

    #[test]
    fn parsed_fields_have_documented_defaults() {
        let fields = SearchFields::from_pairs([("gene", "ND7")]).unwrap();
        assert_eq!(fields, SearchFields::for_gene("ND7"));
        assert_eq!(fields.edit_stop, None);
        assert_eq!(fields.limit, None);
        assert!(!fields.has_mutation && !fields.all);
    }

    #[test]
    fn prefix_narrows_only_for_a_single_sample() {
        let gene = SearchFields::for_gene("G");
        assert_eq!(gene.scan_prefix().unwrap(), b"G\0".to_vec());
        let one = gene.clone().with_sample("s");
        assert_eq!(one.scan_prefix().unwrap(), b"G\0s\0".to_vec());
        assert_eq!(one.clone().with_replicate(2).scan_prefix().unwrap(), b"G\0s\0\x02".to_vec());
        let two = one.with_sample("t").with_replicate(2);
        assert_eq!(two.scan_prefix().unwrap(), b"G\0".to_vec());
        assert!(SearchFields::default().scan_prefix().unwrap().is_empty());
    }

    #[test]
    fn key_filter_checks_samples_and_replicate() {
        let key = AlignmentKey {
            gene: "G".into(),
            sample: "s".into(),
            replicate: 1,
            id: 1,
        };
        let fields = SearchFields::for_gene("G").with_sample("t").with_sample("s");
        assert!(fields.matches_key(&key));
        assert!(!fields.clone().with_replicate(2).matches_key(&key));
        assert!(!SearchFields::for_gene("G").with_sample("x").matches_key(&key));
    }

    #[test]
    fn mutation_toggle_and_all_override() {
        let fields = SearchFields::for_gene("G");
        assert!(fields.matches(&alignment(false)));
        assert!(!fields.matches(&alignment(true)));
        let mutants = SearchFields {
            has_mutation: true,
            ..fields.clone()
        };
        assert!(mutants.matches(&alignment(true)));
        assert!(fields.with_all().matches(&alignment(true)));
    }

    #[test]
    fn exact_sites_and_alt_filter() {
        let mut fields = SearchFields::for_gene("G");
        fields.edit_stop = Some(7);
        fields.junc_end = Some(12);
        assert!(fields.matches(&alignment(false)));
        fields.junc_end = Some(11);
        assert!(!fields.matches(&alignment(false)));

        let alt = SearchFields {
            has_alt: true,
            ..SearchFields::for_gene("G")
        };
        assert!(!alt.matches(&alignment(false)));
        let mut with_alt = alignment(false);
        with_alt.alt_editing = Some(0);
        assert!(alt.matches(&with_alt));
    }

    #[test]
    fn every_requested_guide_bit_must_be_set() {
        let mut fields = SearchFields::for_gene("G");
        fields.grna_edit = vec![0, 2];
        assert!(fields.matches(&alignment(false)));
        fields.grna_edit = vec![0, 1];
        assert!(!fields.matches(&alignment(false)));
        // Indices past the mask are unset.
        fields.grna_edit = vec![9];
        assert!(!fields.matches(&alignment(false)));
        fields.grna_edit.clear();
        fields.grna_junc = vec![1];
        assert!(fields.matches(&alignment(false)));
    }
}
