//! Reference templates for a single gene.
//!
//! A template shares one backbone between all of its variants. Variant 0 is
//! fully edited (FE), variant 1 is pre-edited (PE) and every further variant
//! is an alternative editing pattern that is only valid inside its
//! annotated [`AltRegion`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::codec::{CodecError, CodecResult};
use crate::sequence::{complement, EditCount, Orientation, Sequence};

static ALT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*alt_start=(\d+)\s*").expect("static regex is valid"));
static ALT_STOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*alt_stop=(\d+)\s*").expect("static regex is valid"));

/// Index of the fully edited variant.
pub const FULL_EDITED: usize = 0;
/// Index of the pre-edited variant.
pub const PRE_EDITED: usize = 1;
/// Index of the first alternative variant.
pub const FIRST_ALT: usize = 2;
/// Alternative variant indices are persisted as a signed byte.
pub const MAX_ALT_VARIANTS: usize = i8::MAX as usize;

/// Backbone-position bounds, counted from the 3′ end, where an alternative
/// variant is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltRegion {
    /// Distance from the 3′ end where the alternative pattern begins.
    pub start: u32,
    /// Distance from the 3′ end where the alternative pattern ends.
    pub end: u32,
}

/// Span of a guide RNA, in the same 3′-distance frame as edit stop sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideRna {
    /// Guide name.
    pub name: String,
    /// First covered position.
    pub start: u32,
    /// Last covered position (inclusive).
    pub end: u32,
}

impl GuideRna {
    /// Whether `pos` falls inside this span.
    pub fn contains(&self, pos: u64) -> bool {
        (self.start as u64..=self.end as u64).contains(&pos)
    }

    /// Whether this span overlaps the inclusive range `[lo, hi]`.
    pub fn overlaps(&self, lo: u64, hi: u64) -> bool {
        self.start as u64 <= hi && lo <= self.end as u64
    }
}

/// Which primer end failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimerEnd {
    /// 5′ primer.
    Five,
    /// 3′ primer.
    Three,
}

impl fmt::Display for PrimerEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimerEnd::Five => write!(f, "5'"),
            PrimerEnd::Three => write!(f, "3'"),
        }
    }
}

/// Configuration errors raised while building a template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Fewer than the two mandatory records were supplied.
    #[error("must provide at least 2 templates (full and pre edited), got {0}")]
    TooFewRecords(usize),

    /// A variant does not share the full-edited backbone.
    #[error("template variant {variant} has a different backbone than the full-edited template")]
    BackboneMismatch {
        /// Offending variant index.
        variant: usize,
    },

    /// A variant was decomposed with a different edit base.
    #[error("template variant {variant} uses edit base '{found}', expected '{expected}'")]
    EditBaseMismatch {
        /// Offending variant index.
        variant: usize,
        /// Edit base of the full-edited template.
        expected: char,
        /// Edit base of the offending variant.
        found: char,
    },

    /// Every alternative variant needs exactly one region.
    #[error("found {regions} alt regions for {variants} alternative templates")]
    AltRegionCount {
        /// Regions supplied.
        regions: usize,
        /// Alternative variants supplied.
        variants: usize,
    },

    /// More alternative variants than can be recorded on an alignment.
    #[error("{0} alternative templates exceeds the maximum of {max}", max = MAX_ALT_VARIANTS)]
    TooManyAltVariants(usize),

    /// Primer does not match the template end.
    #[error("invalid {end} primer sequence '{primer}'")]
    InvalidPrimer {
        /// Template end the primer was checked against.
        end: PrimerEnd,
        /// Primer as supplied.
        primer: String,
    },

    /// Guide span is reversed.
    #[error("guide RNA '{name}' has start {start} after end {end}")]
    InvalidGuide {
        /// Guide name.
        name: String,
        /// Span start.
        start: u32,
        /// Span end.
        end: u32,
    },
}

/// Multi-variant reference for one gene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    edit_base: u8,
    backbone: Vec<u8>,
    variants: Vec<Vec<EditCount>>,
    alt_regions: Vec<AltRegion>,
    primer5: u32,
    primer3: u32,
    base_index: Vec<u32>,
    guides: Vec<GuideRna>,
}

impl Template {
    /// Build a template from decomposed variants.
    ///
    /// All variants must share the full-edited backbone and edit base, and
    /// `alt_regions` must pair one-to-one with `alt`.
    pub fn new(
        full: Sequence,
        pre: Sequence,
        alt: Vec<Sequence>,
        alt_regions: Vec<AltRegion>,
    ) -> Result<Self, TemplateError> {
        if alt.len() > MAX_ALT_VARIANTS {
            return Err(TemplateError::TooManyAltVariants(alt.len()));
        }
        if alt.len() != alt_regions.len() {
            return Err(TemplateError::AltRegionCount {
                regions: alt_regions.len(),
                variants: alt.len(),
            });
        }

        let (edit_base, backbone, full_sites) = full.into_parts();
        let mut variants = Vec::with_capacity(alt.len() + 2);
        variants.push(full_sites);

        for (offset, seq) in std::iter::once(pre).chain(alt).enumerate() {
            let variant = offset + PRE_EDITED;
            if seq.edit_base() != edit_base {
                return Err(TemplateError::EditBaseMismatch {
                    variant,
                    expected: edit_base as char,
                    found: seq.edit_base() as char,
                });
            }
            if seq.backbone() != backbone.as_slice() {
                return Err(TemplateError::BackboneMismatch { variant });
            }
            let (_, _, sites) = seq.into_parts();
            variants.push(sites);
        }

        let base_index = build_base_index(&variants[FULL_EDITED], &variants[PRE_EDITED]);

        Ok(Self {
            edit_base,
            backbone,
            variants,
            alt_regions,
            primer5: 0,
            primer3: 0,
            base_index,
            guides: Vec::new(),
        })
    }

    /// Build a template from ordered `(identifier, sequence)` records.
    ///
    /// Record 1 is full-edited, record 2 pre-edited, records 3+ alternative
    /// variants. Alternative records carry their region in the identifier as
    /// `alt_start=<int>` and `alt_stop=<int>`; a record missing either token
    /// contributes no region and fails the region-count check.
    pub fn from_records<I, S, Q>(
        records: I,
        edit_base: u8,
        orientation: Orientation,
    ) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (S, Q)>,
        S: AsRef<str>,
        Q: AsRef<[u8]>,
    {
        let mut sequences = Vec::with_capacity(2);
        let mut regions = Vec::new();

        for (idx, (id, seq)) in records.into_iter().enumerate() {
            sequences.push(Sequence::decompose(seq.as_ref(), edit_base, orientation));
            if idx >= FIRST_ALT {
                if let Some(region) = parse_alt_region(id.as_ref()) {
                    regions.push(region);
                }
            }
        }

        if sequences.len() < 2 {
            return Err(TemplateError::TooFewRecords(sequences.len()));
        }

        let mut sequences = sequences.into_iter();
        let (Some(full), Some(pre)) = (sequences.next(), sequences.next()) else {
            return Err(TemplateError::TooFewRecords(0));
        };
        Self::new(full, pre, sequences.collect(), regions)
    }

    /// Reassemble a template from stored fields, re-checking every invariant.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_raw_parts(
        edit_base: u8,
        backbone: Vec<u8>,
        variants: Vec<Vec<EditCount>>,
        alt_regions: Vec<AltRegion>,
        primer5: u32,
        primer3: u32,
        base_index: Vec<u32>,
        guides: Vec<GuideRna>,
    ) -> CodecResult<Self> {
        let inconsistent = |msg: String| -> CodecResult<Self> { Err(CodecError::Inconsistent(msg)) };
        let sites = backbone.len() + 1;
        if variants.len() < 2 {
            return inconsistent(format!("template has {} variants, need at least 2", variants.len()));
        }
        if let Some(idx) = variants.iter().position(|v| v.len() != sites) {
            return inconsistent(format!(
                "variant {idx} has {} edit sites for a backbone of {}",
                variants[idx].len(),
                backbone.len()
            ));
        }
        if variants.len() - FIRST_ALT > MAX_ALT_VARIANTS {
            return inconsistent(format!("{} alternative variants", variants.len() - FIRST_ALT));
        }
        if alt_regions.len() != variants.len() - FIRST_ALT {
            return inconsistent(format!(
                "{} alt regions for {} alternative variants",
                alt_regions.len(),
                variants.len() - FIRST_ALT
            ));
        }
        if base_index.len() != sites {
            return inconsistent(format!(
                "base index has {} entries for {sites} edit sites",
                base_index.len()
            ));
        }
        if primer5 as usize > backbone.len() || primer3 as usize > backbone.len() {
            return inconsistent(format!(
                "primer lengths {primer5}/{primer3} exceed backbone of {}",
                backbone.len()
            ));
        }
        if backbone.contains(&edit_base) {
            return inconsistent("backbone contains the edit base".to_string());
        }
        if let Some(guide) = guides.iter().find(|g| g.start > g.end) {
            return inconsistent(format!("guide '{}' has start after end", guide.name));
        }
        Ok(Self {
            edit_base,
            backbone,
            variants,
            alt_regions,
            primer5,
            primer3,
            base_index,
            guides,
        })
    }

    /// Require the backbone to start with the primer and exclude it from the
    /// junction-end scan.
    pub fn set_primer5(&mut self, primer: &str) -> Result<(), TemplateError> {
        let p5 = Sequence::decompose(primer.as_bytes(), self.edit_base, Orientation::Forward);
        if !self.backbone.starts_with(p5.backbone()) {
            return Err(TemplateError::InvalidPrimer {
                end: PrimerEnd::Five,
                primer: primer.to_string(),
            });
        }
        self.primer5 = p5.len() as u32;
        Ok(())
    }

    /// Require the backbone to end with the reverse complement of the primer
    /// and exclude it from the junction-start scan.
    pub fn set_primer3(&mut self, primer: &str) -> Result<(), TemplateError> {
        let invalid = || TemplateError::InvalidPrimer {
            end: PrimerEnd::Three,
            primer: primer.to_string(),
        };
        let complemented = primer
            .bytes()
            .map(complement)
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(invalid)?;
        let p3 = Sequence::decompose(&complemented, self.edit_base, Orientation::Reverse);
        if !self.backbone.ends_with(p3.backbone()) {
            return Err(invalid());
        }
        self.primer3 = p3.len() as u32;
        Ok(())
    }

    /// Attach guide RNA spans used for overlap bitsets.
    pub fn with_guides(mut self, guides: Vec<GuideRna>) -> Result<Self, TemplateError> {
        if let Some(bad) = guides.iter().find(|g| g.start > g.end) {
            return Err(TemplateError::InvalidGuide {
                name: bad.name.clone(),
                start: bad.start,
                end: bad.end,
            });
        }
        self.guides = guides;
        Ok(self)
    }

    /// Upper-case edit base shared by all variants.
    pub fn edit_base(&self) -> u8 {
        self.edit_base
    }

    /// Shared backbone.
    pub fn backbone(&self) -> &[u8] {
        &self.backbone
    }

    /// Number of variants (FE, PE and alternatives).
    pub fn size(&self) -> usize {
        self.variants.len()
    }

    /// Number of edit sites (backbone length + 1).
    pub fn sites(&self) -> usize {
        self.backbone.len() + 1
    }

    /// Edit-site counts for a variant.
    pub fn variant(&self, idx: usize) -> Option<&[EditCount]> {
        self.variants.get(idx).map(Vec::as_slice)
    }

    /// All variants in order.
    pub fn variants(&self) -> &[Vec<EditCount>] {
        &self.variants
    }

    /// Regions paired with the alternative variants.
    pub fn alt_regions(&self) -> &[AltRegion] {
        &self.alt_regions
    }

    /// 5′ primer length in backbone positions.
    pub fn primer5(&self) -> u32 {
        self.primer5
    }

    /// 3′ primer length in backbone positions.
    pub fn primer3(&self) -> u32 {
        self.primer3
    }

    /// Cumulative display index for every edit site.
    pub fn base_index(&self) -> &[u32] {
        &self.base_index
    }

    /// Guide RNA spans.
    pub fn guides(&self) -> &[GuideRna] {
        &self.guides
    }

    /// Largest edit count any variant has at `site`.
    pub fn max_count(&self, site: usize) -> EditCount {
        self.variants
            .iter()
            .filter_map(|v| v.get(site).copied())
            .max()
            .unwrap_or(0)
    }

    /// Render one variant back into a raw sequence.
    pub fn render_variant(&self, idx: usize) -> Option<String> {
        let sites = self.variants.get(idx)?;
        let mut out = String::new();
        for (pos, &count) in sites.iter().enumerate() {
            out.extend(std::iter::repeat(self.edit_base as char).take(count as usize));
            if let Some(&base) = self.backbone.get(pos) {
                out.push(base as char);
            }
        }
        Some(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_variant(FULL_EDITED).unwrap_or_default())
    }
}

fn parse_alt_region(id: &str) -> Option<AltRegion> {
    let start = ALT_START.captures(id)?.get(1)?.as_str().parse().unwrap_or(0);
    let end = ALT_STOP.captures(id)?.get(1)?.as_str().parse().unwrap_or(0);
    Some(AltRegion { start, end })
}

fn build_base_index(full: &[EditCount], pre: &[EditCount]) -> Vec<u32> {
    let last = full.len().saturating_sub(1);
    let mut index = 0u32;
    full.iter()
        .zip(pre)
        .enumerate()
        .map(|(i, (&fe, &pe))| {
            index += fe.max(pe);
            if i > 0 && i != last {
                index += 1;
            }
            index
        })
        .collect()
}
