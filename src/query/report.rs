//! Aggregates over search results.

use std::collections::btree_map::{self, BTreeMap};

use super::{QueryError, SearchFields};
use crate::classify::Alignment;
use crate::storage::{Storage, StoreResult};
use crate::template::Template;

/// Immutable gene → template lookup, built once and shared by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneTable {
    templates: BTreeMap<String, Template>,
}

impl GeneTable {
    /// Build from `(gene, template)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Template)>) -> Self {
        Self {
            templates: entries.into_iter().collect(),
        }
    }

    /// Template for `gene`.
    pub fn get(&self, gene: &str) -> Option<&Template> {
        self.templates.get(gene)
    }

    /// Whether `gene` is known.
    pub fn contains(&self, gene: &str) -> bool {
        self.templates.contains_key(gene)
    }

    /// Gene names in order.
    pub fn genes(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Genes and templates in order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Template> {
        self.templates.iter()
    }

    /// Number of genes.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` when no gene is known.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Alignment counts for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SampleTotals {
    /// Alignments counted.
    pub total: u64,
    /// Alignments without insertions, deletions or substitutions.
    pub non_mutant: u64,
}

impl SampleTotals {
    /// Alignments with a mutation.
    pub fn mutant(&self) -> u64 {
        self.total - self.non_mutant
    }

    /// Non-mutant share in percent.
    pub fn non_mutant_percent(&self) -> f64 {
        percent(self.non_mutant, self.total)
    }

    /// Mutant share in percent.
    pub fn mutant_percent(&self) -> f64 {
        percent(self.mutant(), self.total)
    }

    fn add(&mut self, other: SampleTotals) {
        self.total += other.total;
        self.non_mutant += other.non_mutant;
    }
}

/// `x` as a percentage of `y`; 0 when `y` is 0.
pub fn percent(x: u64, y: u64) -> f64 {
    if y == 0 {
        0.0
    } else {
        x as f64 / y as f64 * 100.0
    }
}

/// Site measure plotted by a [`Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// [`Alignment::edit_stop`].
    EditStop,
    /// [`Alignment::junc_len`].
    JuncLen,
}

impl Metric {
    fn value(self, alignment: &Alignment) -> u64 {
        match self {
            Metric::EditStop => alignment.edit_stop,
            Metric::JuncLen => alignment.junc_len,
        }
    }
}

/// Per-sample sums of `norm`, bucketed by a site measure.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Histogram {
    /// Largest site value seen.
    pub max: u64,
    /// Sample → site value → summed `norm`.
    pub samples: BTreeMap<String, BTreeMap<u64, f64>>,
}

impl Histogram {
    /// Site values from `max` down to 0, the order the dense series use.
    pub fn categories(&self) -> Vec<u64> {
        (0..=self.max).rev().collect()
    }

    /// Dense series for `sample`, aligned with [`Histogram::categories`].
    pub fn series(&self, sample: &str) -> Option<Vec<f64>> {
        let buckets = self.samples.get(sample)?;
        Some(
            self.categories()
                .into_iter()
                .map(|site| buckets.get(&site).copied().unwrap_or(0.0))
                .collect(),
        )
    }
}

fn require_gene(fields: &SearchFields) -> Result<&str, QueryError> {
    fields.gene.as_deref().ok_or(QueryError::MissingGene)
}

/// Count every alignment of `gene`, mutant or not, per sample.
pub fn sample_totals(storage: &Storage, gene: &str) -> StoreResult<BTreeMap<String, SampleTotals>> {
    let fields = SearchFields::for_gene(gene).with_all();
    let mut totals: BTreeMap<String, SampleTotals> = BTreeMap::new();
    storage.search(&fields, |key, alignment| {
        let entry = totals.entry(key.sample.clone()).or_default();
        entry.add(SampleTotals {
            total: 1,
            non_mutant: u64::from(!alignment.has_mutation),
        });
    })?;
    Ok(totals)
}

/// Sum of every sample's totals.
pub fn grand_total<'a>(totals: impl IntoIterator<Item = &'a SampleTotals>) -> SampleTotals {
    totals.into_iter().fold(SampleTotals::default(), |mut acc, t| {
        acc.add(*t);
        acc
    })
}

/// Histogram of `metric` weighted by `norm` over alignments matching `fields`.
///
/// `fields.gene` is required.
pub fn weighted_histogram(storage: &Storage, fields: &SearchFields, metric: Metric) -> StoreResult<Histogram> {
    require_gene(fields)?;
    let mut hist = Histogram::default();
    storage.search(fields, |key, alignment| {
        let site = metric.value(alignment);
        hist.max = hist.max.max(site);
        *hist
            .samples
            .entry(key.sample.clone())
            .or_default()
            .entry(site)
            .or_insert(0.0) += alignment.norm;
    })?;
    Ok(hist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_handle_empty_samples() {
        let totals = SampleTotals {
            total: 8,
            non_mutant: 6,
        };
        assert_eq!(totals.mutant(), 2);
        assert!((totals.non_mutant_percent() - 75.0).abs() < 1e-9);
        assert!((totals.mutant_percent() - 25.0).abs() < 1e-9);
        assert_eq!(SampleTotals::default().mutant_percent(), 0.0);
    }

    #[test]
    fn grand_total_sums_samples() {
        let a = SampleTotals { total: 3, non_mutant: 1 };
        let b = SampleTotals { total: 4, non_mutant: 4 };
        assert_eq!(grand_total([&a, &b]), SampleTotals { total: 7, non_mutant: 5 });
    }

    #[test]
    fn dense_series_run_from_max_to_zero() {
        let mut hist = Histogram {
            max: 3,
            ..Histogram::default()
        };
        hist.samples
            .entry("wt".into())
            .or_default()
            .extend([(0, 1.5), (3, 2.0)]);
        assert_eq!(hist.categories(), vec![3, 2, 1, 0]);
        assert_eq!(hist.series("wt").unwrap(), vec![2.0, 0.0, 0.0, 1.5]);
        assert!(hist.series("ko").is_none());
    }

    #[test]
    fn histogram_requires_gene() {
        let store = Storage::open_in_memory().unwrap();
        let err = weighted_histogram(&store, &SearchFields::default(), Metric::EditStop).unwrap_err();
        assert!(matches!(
            err,
            crate::storage::StoreError::Query(QueryError::MissingGene)
        ));
    }
}
