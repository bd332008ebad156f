//! Edit-site sequence model.
//!
//! A sequence is stored as its non-edited *backbone* plus, for every gap
//! between backbone characters (including before the first and after the
//! last), the number of edit bases found there. For a backbone of length
//! `n` there are always `n + 1` edit sites.

mod fragment;

pub use fragment::{parse_multiplicity, Fragment};

use std::fmt;

/// Count of edit bases at a single edit site.
pub type EditCount = u32;

/// Read orientation of a raw sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Sequence is already 5′ → 3′.
    #[default]
    Forward,
    /// Sequence must be reversed before decomposition.
    Reverse,
}

/// Backbone plus per-site edit counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    edit_base: u8,
    backbone: Vec<u8>,
    edit_sites: Vec<EditCount>,
}

impl Sequence {
    /// Split a raw sequence into backbone and edit-site counts.
    ///
    /// Reverse orientation is canonicalised to 5′ → 3′ first and everything
    /// is upper-cased. A sequence made only of edit bases yields an empty
    /// backbone and a single edit site.
    pub fn decompose(raw: &[u8], edit_base: u8, orientation: Orientation) -> Self {
        let edit_base = edit_base.to_ascii_uppercase();
        let mut backbone = Vec::with_capacity(raw.len());
        let mut edit_sites = Vec::with_capacity(raw.len() + 1);
        let mut run: EditCount = 0;

        let mut push = |base: u8| {
            let base = base.to_ascii_uppercase();
            if base == edit_base {
                run += 1;
            } else {
                edit_sites.push(run);
                backbone.push(base);
                run = 0;
            }
        };

        match orientation {
            Orientation::Forward => raw.iter().copied().for_each(&mut push),
            Orientation::Reverse => raw.iter().rev().copied().for_each(&mut push),
        }
        edit_sites.push(run);

        Self {
            edit_base,
            backbone,
            edit_sites,
        }
    }

    /// Build a sequence from an existing backbone and edit-site counts.
    ///
    /// Returns `None` when `edit_sites.len() != backbone.len() + 1` or the
    /// backbone itself contains the edit base.
    pub fn from_parts(edit_base: u8, backbone: Vec<u8>, edit_sites: Vec<EditCount>) -> Option<Self> {
        let edit_base = edit_base.to_ascii_uppercase();
        if edit_sites.len() != backbone.len() + 1 || backbone.contains(&edit_base) {
            return None;
        }
        Some(Self {
            edit_base,
            backbone,
            edit_sites,
        })
    }

    /// Upper-case edit base.
    pub fn edit_base(&self) -> u8 {
        self.edit_base
    }

    /// Non-edited characters in 5′ → 3′ order.
    pub fn backbone(&self) -> &[u8] {
        &self.backbone
    }

    /// Edit-base counts; always one longer than the backbone.
    pub fn edit_sites(&self) -> &[EditCount] {
        &self.edit_sites
    }

    /// Number of backbone characters.
    pub fn len(&self) -> usize {
        self.backbone.len()
    }

    /// Returns `true` when the backbone is empty.
    pub fn is_empty(&self) -> bool {
        self.backbone.is_empty()
    }

    /// Total number of edit bases across all sites.
    pub fn edit_total(&self) -> u64 {
        self.edit_sites.iter().map(|&c| c as u64).sum()
    }

    /// Interleave edit-base runs with backbone characters.
    pub fn render(&self) -> String {
        let capacity = self.backbone.len() + self.edit_total() as usize;
        let mut out = String::with_capacity(capacity);
        for (idx, &count) in self.edit_sites.iter().enumerate() {
            out.extend(std::iter::repeat(self.edit_base as char).take(count as usize));
            if let Some(&base) = self.backbone.get(idx) {
                out.push(base as char);
            }
        }
        out
    }

    pub(crate) fn into_parts(self) -> (u8, Vec<u8>, Vec<EditCount>) {
        (self.edit_base, self.backbone, self.edit_sites)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Watson-Crick complement of an upper- or lower-case nucleotide.
///
/// `N` maps to itself; anything else has no complement.
pub fn complement(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
        b'A' => Some(b'T'),
        b'C' => Some(b'G'),
        b'G' => Some(b'C'),
        b'T' => Some(b'A'),
        b'N' => Some(b'N'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_counts_runs_before_each_backbone_base() {
        let seq = Sequence::decompose(b"ttCCAATTGCAATTT", b't', Orientation::Forward);
        assert_eq!(seq.backbone(), b"CCAAGCAA");
        assert_eq!(seq.edit_sites(), &[2, 0, 0, 0, 2, 0, 0, 0, 3]);
        assert_eq!(seq.edit_base(), b'T');
    }

    #[test]
    fn reverse_orientation_is_canonicalised() {
        let forward = Sequence::decompose(b"ACTTG", b'T', Orientation::Forward);
        let reverse = Sequence::decompose(b"GTTCA", b'T', Orientation::Reverse);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn all_edit_bases_give_single_site() {
        let seq = Sequence::decompose(b"TTTT", b'T', Orientation::Forward);
        assert!(seq.is_empty());
        assert_eq!(seq.edit_sites(), &[4]);
        assert_eq!(seq.render(), "TTTT");
    }

    #[test]
    fn empty_input_has_one_zero_site() {
        let seq = Sequence::decompose(b"", b'T', Orientation::Forward);
        assert_eq!(seq.edit_sites(), &[0]);
        assert_eq!(seq.render(), "");
    }

    #[test]
    fn render_inverts_decompose() {
        let raw = "TTGACTTTAGGT";
        let seq = Sequence::decompose(raw.as_bytes(), b'T', Orientation::Forward);
        assert_eq!(seq.render(), raw);
    }

    #[test]
    fn from_parts_rejects_bad_site_count() {
        assert!(Sequence::from_parts(b'T', b"AC".to_vec(), vec![0, 1]).is_none());
        assert!(Sequence::from_parts(b'T', b"AT".to_vec(), vec![0, 1, 0]).is_none());
        assert!(Sequence::from_parts(b'T', b"AC".to_vec(), vec![0, 1, 0]).is_some());
    }

    #[test]
    fn complement_handles_case_and_unknowns() {
        assert_eq!(complement(b'a'), Some(b'T'));
        assert_eq!(complement(b'N'), Some(b'N'));
        assert_eq!(complement(b'X'), None);
    }
}
