use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;

/// One column of a global alignment between template and fragment backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignColumn {
    /// Template and fragment characters aligned (match or substitution).
    Paired,
    /// Gap in the template: the fragment carries an inserted character.
    TemplateGap,
    /// Gap in the fragment: a template character was deleted.
    FragmentGap,
}

/// Produces a gapped global alignment of two backbones.
///
/// Implementations must consume both inputs completely: the number of
/// `Paired + FragmentGap` columns equals `template.len()` and the number of
/// `Paired + TemplateGap` columns equals `fragment.len()`.
pub trait GlobalAligner {
    /// Align `fragment` against `template`.
    fn align(&mut self, template: &[u8], fragment: &[u8]) -> Vec<AlignColumn>;
}

/// Linear-gap Needleman-Wunsch scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedlemanWunsch {
    /// Score for identical characters.
    pub match_score: i32,
    /// Score for differing characters.
    pub mismatch_score: i32,
    /// Score per gap position (must be ≤ 0).
    pub gap_score: i32,
}

impl Default for NeedlemanWunsch {
    fn default() -> Self {
        Self {
            match_score: 1,
            mismatch_score: -1,
            gap_score: -1,
        }
    }
}

impl GlobalAligner for NeedlemanWunsch {
    fn align(&mut self, template: &[u8], fragment: &[u8]) -> Vec<AlignColumn> {
        if template.is_empty() {
            return vec![AlignColumn::TemplateGap; fragment.len()];
        }
        if fragment.is_empty() {
            return vec![AlignColumn::FragmentGap; template.len()];
        }

        let (hit, miss) = (self.match_score, self.mismatch_score);
        let score = move |a: u8, b: u8| if a == b { hit } else { miss };
        let mut aligner =
            Aligner::with_capacity(template.len(), fragment.len(), 0, self.gap_score.min(0), score);
        let alignment = aligner.global(template, fragment);

        let mut columns = Vec::with_capacity(template.len().max(fragment.len()));
        for op in alignment.operations {
            match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    columns.push(AlignColumn::Paired)
                }
                // x is the template: Del consumes only the fragment, Ins only the template.
                AlignmentOperation::Del => columns.push(AlignColumn::TemplateGap),
                AlignmentOperation::Ins => columns.push(AlignColumn::FragmentGap),
                AlignmentOperation::Xclip(n) => {
                    columns.extend(std::iter::repeat(AlignColumn::FragmentGap).take(n))
                }
                AlignmentOperation::Yclip(n) => {
                    columns.extend(std::iter::repeat(AlignColumn::TemplateGap).take(n))
                }
            }
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumed(columns: &[AlignColumn]) -> (usize, usize) {
        columns.iter().fold((0, 0), |(t, f), col| match col {
            AlignColumn::Paired => (t + 1, f + 1),
            AlignColumn::TemplateGap => (t, f + 1),
            AlignColumn::FragmentGap => (t + 1, f),
        })
    }

    #[test]
    fn identical_backbones_align_without_gaps() {
        let columns = NeedlemanWunsch::default().align(b"CCAAGCAA", b"CCAAGCAA");
        assert_eq!(columns, vec![AlignColumn::Paired; 8]);
    }

    #[test]
    fn extra_fragment_base_is_a_template_gap() {
        let columns = NeedlemanWunsch::default().align(b"ACGACG", b"ACGCACG");
        assert_eq!(consumed(&columns), (6, 7));
        assert_eq!(
            columns.iter().filter(|c| **c == AlignColumn::TemplateGap).count(),
            1
        );
    }

    #[test]
    fn missing_fragment_base_is_a_fragment_gap() {
        let columns = NeedlemanWunsch::default().align(b"ACGCACG", b"ACGACG");
        assert_eq!(consumed(&columns), (7, 6));
        assert_eq!(
            columns.iter().filter(|c| **c == AlignColumn::FragmentGap).count(),
            1
        );
    }

    #[test]
    fn empty_inputs_become_pure_gaps() {
        let mut nw = NeedlemanWunsch::default();
        assert_eq!(nw.align(b"", b"AC"), vec![AlignColumn::TemplateGap; 2]);
        assert_eq!(nw.align(b"AC", b""), vec![AlignColumn::FragmentGap; 2]);
        assert!(nw.align(b"", b"").is_empty());
    }
}
