use proptest::prelude::*;
use treat::sequence::{parse_multiplicity, Orientation, Sequence};

fn bases() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], 0..80)
}

proptest! {
    #[test]
    fn render_inverts_decompose(raw in bases()) {
        let seq = Sequence::decompose(&raw, b'T', Orientation::Forward);
        prop_assert_eq!(seq.render().into_bytes(), raw);
    }

    #[test]
    fn edit_sites_are_one_longer_than_backbone(raw in bases(), edit in prop_oneof![Just(b'A'), Just(b'T')]) {
        let seq = Sequence::decompose(&raw, edit, Orientation::Forward);
        prop_assert_eq!(seq.edit_sites().len(), seq.backbone().len() + 1);
        prop_assert!(!seq.backbone().contains(&edit));
        prop_assert_eq!(seq.len() as u64 + seq.edit_total(), raw.len() as u64);
    }

    #[test]
    fn reverse_orientation_reads_the_reversed_string(raw in bases()) {
        let mut reversed = raw.clone();
        reversed.reverse();
        prop_assert_eq!(
            Sequence::decompose(&raw, b'T', Orientation::Reverse),
            Sequence::decompose(&reversed, b'T', Orientation::Forward)
        );
    }

    #[test]
    fn lower_case_input_decomposes_like_upper_case(raw in bases()) {
        let lower = raw.to_ascii_lowercase();
        prop_assert_eq!(
            Sequence::decompose(&lower, b't', Orientation::Forward),
            Sequence::decompose(&raw, b'T', Orientation::Forward)
        );
    }

    #[test]
    fn trailing_count_is_the_multiplicity(prefix in "[A-Za-z]{1,12}", count in 0u32..1_000_000) {
        prop_assert_eq!(parse_multiplicity(&format!("{prefix}_{count}")), count);
        prop_assert_eq!(parse_multiplicity(&format!("{prefix}-{count}")), count);
        prop_assert_eq!(parse_multiplicity(&prefix), 1);
    }
}
