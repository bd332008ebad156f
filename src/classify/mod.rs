//! Editing classifier.
//!
//! A fragment is globally aligned to the template backbone, then every edit
//! site is compared against every template variant. The resulting per-variant
//! match sets locate where full editing stops (scanning from the 3′ end),
//! where pre-editing begins (scanning from the 5′ end) and whether an
//! alternative editing pattern explains the junction.
//!
//! All scans take the first qualifying site in their direction; positions
//! are reported as distances from the 3′ end of the alignment.

mod aligner;
mod view;

pub use aligner::{AlignColumn, GlobalAligner, NeedlemanWunsch};
pub use view::AlignmentView;

use bitvec::prelude::*;
use thiserror::Error;

use crate::sequence::{EditCount, Fragment, Sequence};
use crate::template::{Template, FIRST_ALT, FULL_EDITED, PRE_EDITED};

/// Guide RNA overlap mask, one bit per template guide.
pub type GuideMask = BitVec<u8, Msb0>;

/// Errors raised while classifying a fragment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// Fragment and template were decomposed on different edit bases.
    #[error("fragment edit base '{fragment}' does not match template edit base '{template}'")]
    EditBaseMismatch {
        /// Template edit base.
        template: char,
        /// Fragment edit base.
        fragment: char,
    },

    /// Aligner output does not consume both backbones exactly.
    #[error("alignment consumed {template_used}/{template_len} template and {fragment_used}/{fragment_len} fragment positions")]
    InconsistentAlignment {
        /// Template positions consumed.
        template_used: usize,
        /// Template backbone length.
        template_len: usize,
        /// Fragment positions consumed.
        fragment_used: usize,
        /// Fragment backbone length.
        fragment_len: usize,
    },
}

/// Classification of one fragment against its gene template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alignment {
    /// Last site matching full editing, 0 when the junction starts at the 3′ end.
    pub edit_stop: u64,
    /// First site (from the 3′ end) that does not match full editing.
    pub junc_start: u64,
    /// First site (from the 5′ end) that does not match pre-editing.
    pub junc_end: u64,
    /// Junction length, 0 when `junc_end <= junc_start`.
    pub junc_len: u64,
    /// Collapsed read multiplicity of the fragment.
    pub read_count: u32,
    /// Normalised abundance of the fragment.
    pub norm: f64,
    /// Any insertion, deletion or backbone substitution was seen.
    pub has_mutation: bool,
    /// Index (among alternative variants) of the matched alternative pattern.
    pub alt_editing: Option<u8>,
    /// Guides whose span contains the edit stop site.
    pub grna_edit: GuideMask,
    /// Guides whose span overlaps the junction.
    pub grna_junc: GuideMask,
}

impl Alignment {
    /// Whether guide `idx` covers the edit stop site.
    pub fn has_guide_edit(&self, idx: usize) -> bool {
        self.grna_edit.get(idx).map_or(false, |bit| *bit)
    }

    /// Whether guide `idx` overlaps the junction.
    pub fn has_guide_junc(&self, idx: usize) -> bool {
        self.grna_junc.get(idx).map_or(false, |bit| *bit)
    }
}

/// Classify a fragment with the default Needleman-Wunsch aligner.
pub fn classify(fragment: &Fragment, template: &Template) -> Result<Alignment, ClassifyError> {
    classify_with(fragment, template, &mut NeedlemanWunsch::default())
}

/// Classify a fragment using a caller-supplied global aligner.
pub fn classify_with<A>(
    fragment: &Fragment,
    template: &Template,
    aligner: &mut A,
) -> Result<Alignment, ClassifyError>
where
    A: GlobalAligner + ?Sized,
{
    let seq = fragment.sequence();
    check_edit_base(seq, template)?;
    let columns = aligner.align(template.backbone(), seq.backbone());
    let matrix = MatchMatrix::build(seq, template, &columns)?;

    let mut alignment = matrix.boundaries(template);
    alignment.read_count = fragment.read_count;
    alignment.norm = fragment.norm;
    Ok(alignment)
}

pub(crate) fn check_edit_base(seq: &Sequence, template: &Template) -> Result<(), ClassifyError> {
    if seq.edit_base() != template.edit_base() {
        return Err(ClassifyError::EditBaseMismatch {
            template: template.edit_base() as char,
            fragment: seq.edit_base() as char,
        });
    }
    Ok(())
}

pub(crate) fn check_columns(
    columns: &[AlignColumn],
    template_len: usize,
    fragment_len: usize,
) -> Result<(), ClassifyError> {
    let (template_used, fragment_used) = columns.iter().fold((0, 0), |(t, f), col| match col {
        AlignColumn::Paired => (t + 1, f + 1),
        AlignColumn::TemplateGap => (t, f + 1),
        AlignColumn::FragmentGap => (t + 1, f),
    });
    if template_used != template_len || fragment_used != fragment_len {
        return Err(ClassifyError::InconsistentAlignment {
            template_used,
            template_len,
            fragment_used,
            fragment_len,
        });
    }
    Ok(())
}

/// Per-variant match bits indexed by template edit site.
#[derive(Debug)]
struct MatchMatrix {
    rows: Vec<BitVec>,
    last: usize,
    has_mutation: bool,
}

impl MatchMatrix {
    fn build(
        fragment: &Sequence,
        template: &Template,
        columns: &[AlignColumn],
    ) -> Result<Self, ClassifyError> {
        check_columns(columns, template.backbone().len(), fragment.len())?;

        let mut matrix = Self {
            rows: vec![bitvec![0; template.sites()]; template.size()],
            last: 0,
            has_mutation: false,
        };
        let frag_bases = fragment.backbone();
        let frag_sites = fragment.edit_sites();
        let tmpl_bases = template.backbone();

        let (mut fi, mut ti) = (0usize, 0usize);
        for column in columns {
            match column {
                AlignColumn::TemplateGap => {
                    matrix.has_mutation = true;
                    fi += 1;
                }
                AlignColumn::FragmentGap => {
                    matrix.has_mutation = true;
                    matrix.mark(template, ti, 0);
                    ti += 1;
                }
                AlignColumn::Paired => {
                    if frag_bases[fi] != tmpl_bases[ti] {
                        matrix.has_mutation = true;
                    }
                    matrix.mark(template, ti, frag_sites[fi]);
                    fi += 1;
                    ti += 1;
                }
            }
        }

        // Trailing edit site after the last backbone position.
        matrix.mark(template, ti, frag_sites[fi]);
        matrix.last = ti;
        Ok(matrix)
    }

    fn mark(&mut self, template: &Template, site: usize, count: EditCount) {
        for (row, variant) in self.rows.iter_mut().zip(template.variants()) {
            if variant[site] == count {
                row.set(site, true);
            }
        }
    }

    /// First full-edit mismatch scanning 5′-ward from `from`, skipping the 3′ primer.
    fn junction_start(&self, from: usize, primer3: usize) -> Option<u64> {
        let limit = self.last.checked_sub(primer3)?;
        let fe = &self.rows[FULL_EDITED];
        (0..=from.min(limit))
            .rev()
            .find(|&site| !fe[site])
            .map(|site| (self.last - site) as u64)
    }

    /// First pre-edit mismatch scanning 3′-ward, skipping the 5′ primer.
    fn junction_end(&self, primer5: usize) -> Option<u64> {
        let pe = &self.rows[PRE_EDITED];
        (primer5..=self.last)
            .find(|&site| !pe[site])
            .map(|site| (self.last - site) as u64)
    }

    fn alt_editing(&self, template: &Template, junc_start: u64) -> Option<(u8, usize)> {
        let shift = self.last - junc_start as usize;
        let alt = self.rows[FIRST_ALT..].iter().position(|row| row[shift])?;
        let region = template.alt_regions()[alt];
        if junc_start != region.start as u64 {
            return None;
        }

        // Walk 5′-ward past the sites still explained by the alternative pattern.
        let row = &self.rows[FIRST_ALT + alt];
        let shifted = (0..=shift).rev().find(|&site| !row[site]).unwrap_or(shift);
        if (self.last - shifted) as u64 > region.end as u64 {
            Some((alt as u8, shifted))
        } else {
            None
        }
    }

    fn boundaries(&self, template: &Template) -> Alignment {
        let primer3 = template.primer3() as usize;
        let mut junc_start = self.junction_start(self.last, primer3).unwrap_or(0);

        let alt_editing = match self.alt_editing(template, junc_start) {
            Some((alt, shifted)) => {
                if let Some(start) = self.junction_start(shifted, primer3) {
                    junc_start = start;
                }
                Some(alt)
            }
            None => None,
        };

        let junc_end = self.junction_end(template.primer5() as usize).unwrap_or(0);
        let edit_stop = junc_start.saturating_sub(1);
        let junc_len = if junc_end > junc_start {
            junc_end - edit_stop
        } else {
            0
        };

        let guides = template.guides();
        let grna_edit = guides.iter().map(|g| g.contains(edit_stop)).collect();
        let grna_junc = guides
            .iter()
            .map(|g| junc_len > 0 && g.overlaps(edit_stop, junc_end))
            .collect();

        Alignment {
            edit_stop,
            junc_start,
            junc_end,
            junc_len,
            has_mutation: self.has_mutation,
            alt_editing,
            grna_edit,
            grna_junc,
            ..Alignment::default()
        }
    }
}
