mod common;

use bitvec::prelude::*;
use proptest::prelude::*;
use treat::classify::{Alignment, GuideMask};
use treat::codec::{CodecError, Record};
use treat::sequence::{Fragment, Sequence};
use treat::template::{AltRegion, GuideRna, Template};

fn backbone() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G')], 0..40)
}

fn mask() -> impl Strategy<Value = GuideMask> {
    proptest::collection::vec(any::<bool>(), 0..20).prop_map(|bits| bits.into_iter().collect())
}

fn alignment() -> impl Strategy<Value = Alignment> {
    (
        any::<[u64; 4]>(),
        any::<u32>(),
        -1.0e9f64..1.0e9,
        any::<bool>(),
        proptest::option::of(0u8..=127),
        mask(),
        mask(),
    )
        .prop_map(|(sites, read_count, norm, has_mutation, alt_editing, grna_edit, grna_junc)| Alignment {
            edit_stop: sites[0],
            junc_start: sites[1],
            junc_end: sites[2],
            junc_len: sites[3],
            read_count,
            norm,
            has_mutation,
            alt_editing,
            grna_edit,
            grna_junc,
        })
}

fn fragment() -> impl Strategy<Value = Fragment> {
    (backbone(), "[a-zA-Z0-9_-]{1,24}", any::<u32>(), 0.0f64..1.0e6).prop_flat_map(
        |(backbone, name, read_count, norm)| {
            let sites = proptest::collection::vec(0u32..50, backbone.len() + 1);
            (Just(backbone), Just(name), Just(read_count), Just(norm), sites)
        },
    )
    .prop_map(|(backbone, name, read_count, norm, sites)| {
        let seq = Sequence::from_parts(b'T', backbone, sites).expect("site count matches");
        Fragment::from_sequence(name, read_count, norm, seq)
    })
}

fn template() -> impl Strategy<Value = Template> {
    (backbone(), 0usize..4).prop_flat_map(|(backbone, alts)| {
        let sites = backbone.len() + 1;
        let variants = proptest::collection::vec(proptest::collection::vec(0u32..6, sites), alts + 2);
        let regions = proptest::collection::vec((0u32..40, 0u32..40), alts);
        let guides = proptest::collection::vec(("[a-z]{1,6}", 0u32..20, 0u32..20), 0..4);
        (Just(backbone), variants, regions, guides)
    })
    .prop_map(|(backbone, variants, regions, guides)| {
        let mut seqs = variants
            .into_iter()
            .map(|sites| Sequence::from_parts(b'T', backbone.clone(), sites).expect("site count matches"));
        let full = seqs.next().expect("FE variant");
        let pre = seqs.next().expect("PE variant");
        let regions = regions
            .into_iter()
            .map(|(start, end)| AltRegion { start, end })
            .collect();
        let guides = guides
            .into_iter()
            .map(|(name, a, b)| GuideRna {
                name,
                start: a.min(b),
                end: a.max(b),
            })
            .collect();
        Template::new(full, pre, seqs.collect(), regions)
            .expect("variants share a backbone")
            .with_guides(guides)
            .expect("ordered guide spans")
    })
}

proptest! {
    #[test]
    fn alignments_round_trip(aln in alignment()) {
        let bytes = aln.encode().expect("encodes");
        prop_assert_eq!(Alignment::decode(&bytes).expect("decodes"), aln);
    }

    #[test]
    fn fragments_round_trip(frag in fragment()) {
        let bytes = frag.encode().expect("encodes");
        prop_assert_eq!(Fragment::decode(&bytes).expect("decodes"), frag);
    }

    #[test]
    fn templates_round_trip(tmpl in template()) {
        let bytes = tmpl.encode().expect("encodes");
        prop_assert_eq!(Template::decode(&bytes).expect("decodes"), tmpl);
    }

    #[test]
    fn truncated_alignments_never_decode(aln in alignment(), cut in any::<prop::sample::Index>()) {
        let bytes = aln.encode().expect("encodes");
        let cut = cut.index(bytes.len());
        let truncated = matches!(
            Alignment::decode(&bytes[..cut]),
            Err(CodecError::Truncated { .. })
        );
        prop_assert!(truncated);
    }

    #[test]
    fn encoding_is_deterministic(frag in fragment()) {
        prop_assert_eq!(frag.encode().expect("encodes"), frag.clone().encode().expect("encodes"));
    }
}

#[test]
fn mask_tail_bits_do_not_leak_into_encoding() {
    let mut dirty = bitvec![u8, Msb0; 1; 8];
    dirty.truncate(3);
    let clean = bitvec![u8, Msb0; 1, 1, 1];
    let a = Alignment {
        grna_edit: dirty,
        ..Alignment::default()
    };
    let b = Alignment {
        grna_edit: clean,
        ..Alignment::default()
    };
    assert_eq!(a.encode().unwrap(), b.encode().unwrap());
}

#[test]
fn stored_template_helper_round_trips() {
    let tmpl = common::step_template();
    assert_eq!(Template::decode(&tmpl.encode().unwrap()).unwrap(), tmpl);
}
