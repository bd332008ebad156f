use std::io::{Read, Write};

use super::*;
use crate::classify::{Alignment, GuideMask};
use crate::sequence::{Fragment, Sequence};
use crate::template::{AltRegion, GuideRna, Template};

impl Record for Template {
    fn write_to<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        write_u8(w, self.edit_base())?;
        write_bytes(w, self.backbone(), "backbone")?;

        write_len(w, self.size(), "variants")?;
        for variant in self.variants() {
            write_counts(w, variant, "variant")?;
        }

        write_len(w, self.alt_regions().len(), "alt_regions")?;
        for region in self.alt_regions() {
            write_u32(w, region.start)?;
            write_u32(w, region.end)?;
        }

        write_u32(w, self.primer5())?;
        write_u32(w, self.primer3())?;
        write_counts(w, self.base_index(), "base_index")?;

        write_len(w, self.guides().len(), "guides")?;
        for guide in self.guides() {
            write_bytes(w, guide.name.as_bytes(), "guide name")?;
            write_u32(w, guide.start)?;
            write_u32(w, guide.end)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> CodecResult<Self> {
        let edit_base = read_u8(r, "edit_base")?;
        let backbone = read_bytes(r, "backbone")?;

        let count = read_u32(r, "variants")?;
        let variants = (0..count)
            .map(|_| read_counts(r, "variant"))
            .collect::<CodecResult<Vec<_>>>()?;

        let count = read_u32(r, "alt_regions")?;
        let alt_regions = (0..count)
            .map(|_| -> CodecResult<AltRegion> {
                Ok(AltRegion {
                    start: read_u32(r, "alt_region start")?,
                    end: read_u32(r, "alt_region end")?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;

        let primer5 = read_u32(r, "primer5")?;
        let primer3 = read_u32(r, "primer3")?;
        let base_index = read_counts(r, "base_index")?;

        let count = read_u32(r, "guides")?;
        let guides = (0..count)
            .map(|_| -> CodecResult<GuideRna> {
                Ok(GuideRna {
                    name: read_string(r, "guide name")?,
                    start: read_u32(r, "guide start")?,
                    end: read_u32(r, "guide end")?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;

        Template::from_raw_parts(
            edit_base,
            backbone,
            variants,
            alt_regions,
            primer5,
            primer3,
            base_index,
            guides,
        )
    }
}

impl Record for Fragment {
    fn write_to<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        let seq = self.sequence();
        write_bytes(w, self.name.as_bytes(), "name")?;
        write_u32(w, self.read_count)?;
        write_f64(w, self.norm)?;
        write_u8(w, seq.edit_base())?;
        write_bytes(w, seq.backbone(), "backbone")?;
        write_counts(w, seq.edit_sites(), "edit_sites")
    }

    fn read_from<R: Read>(r: &mut R) -> CodecResult<Self> {
        let name = read_string(r, "name")?;
        let read_count = read_u32(r, "read_count")?;
        let norm = read_f64(r, "norm")?;
        let edit_base = read_u8(r, "edit_base")?;
        let backbone = read_bytes(r, "backbone")?;
        let edit_sites = read_counts(r, "edit_sites")?;

        let (backbone_len, sites_len) = (backbone.len(), edit_sites.len());
        let sequence = Sequence::from_parts(edit_base, backbone, edit_sites).ok_or_else(|| {
            CodecError::Inconsistent(format!(
                "fragment '{name}' has {sites_len} edit sites for a backbone of {backbone_len}"
            ))
        })?;
        Ok(Fragment::from_sequence(name, read_count, norm, sequence))
    }
}

impl Record for Alignment {
    fn write_to<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        write_u64(w, self.edit_stop)?;
        write_u64(w, self.junc_start)?;
        write_u64(w, self.junc_end)?;
        write_u64(w, self.junc_len)?;
        write_u32(w, self.read_count)?;
        write_f64(w, self.norm)?;
        write_u8(w, u8::from(self.has_mutation))?;

        let alt = match self.alt_editing {
            None => -1,
            Some(idx) => i8::try_from(idx).map_err(|_| CodecError::FieldOverflow {
                field: "alt_editing",
                len: idx as usize,
            })?,
        };
        write_i8(w, alt)?;

        write_mask(w, &self.grna_edit, "grna_edit")?;
        write_mask(w, &self.grna_junc, "grna_junc")
    }

    fn read_from<R: Read>(r: &mut R) -> CodecResult<Self> {
        let edit_stop = read_u64(r, "edit_stop")?;
        let junc_start = read_u64(r, "junc_start")?;
        let junc_end = read_u64(r, "junc_end")?;
        let junc_len = read_u64(r, "junc_len")?;
        let read_count = read_u32(r, "read_count")?;
        let norm = read_f64(r, "norm")?;
        let has_mutation = read_bool(r, "has_mutation")?;
        let alt_editing = match read_i8(r, "alt_editing")? {
            -1 => None,
            idx if idx >= 0 => Some(idx as u8),
            idx => {
                return Err(CodecError::InvalidFlag {
                    field: "alt_editing",
                    value: idx as u8,
                })
            }
        };
        let grna_edit = read_mask(r, "grna_edit")?;
        let grna_junc = read_mask(r, "grna_junc")?;

        Ok(Alignment {
            edit_stop,
            junc_start,
            junc_end,
            junc_len,
            read_count,
            norm,
            has_mutation,
            alt_editing,
            grna_edit,
            grna_junc,
        })
    }
}

// Masks are stored as their bit length followed by the Msb0 bytes, unused
// tail bits cleared.
fn write_mask<W: Write>(w: &mut W, mask: &GuideMask, field: &'static str) -> CodecResult<()> {
    write_len(w, mask.len(), field)?;
    let mut raw = mask.clone();
    raw.set_uninitialized(false);
    w.write_all(raw.as_raw_slice()).map_err(CodecError::Io)
}

fn read_mask<R: Read>(r: &mut R, field: &'static str) -> CodecResult<GuideMask> {
    let bits = read_u32(r, field)? as usize;
    let bytes = read_exact_vec(r, bits.div_ceil(8), field)?;
    let mut mask = GuideMask::from_vec(bytes);
    mask.truncate(bits);
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Orientation;
    use bitvec::prelude::*;

    fn template() -> Template {
        let seq = |raw: &str| Sequence::decompose(raw.as_bytes(), b'T', Orientation::Forward);
        let mut tmpl = Template::new(
            seq("TTCCAATTGCAATTT"),
            seq("TTTTCCAATTTTGCAATTTTT"),
            vec![seq("TCCAATTGCAATT")],
            vec![AltRegion { start: 3, end: 7 }],
        )
        .unwrap()
        .with_guides(vec![GuideRna {
            name: "gA6[14]".into(),
            start: 1,
            end: 4,
        }])
        .unwrap();
        tmpl.set_primer5("CC").unwrap();
        tmpl
    }

    #[test]
    fn template_round_trips() {
        let tmpl = template();
        let bytes = tmpl.encode().unwrap();
        assert_eq!(Template::decode(&bytes).unwrap(), tmpl);
    }

    #[test]
    fn fragment_round_trips() {
        let frag = Fragment::new("read_12", b"ttACGTA", Orientation::Forward, b'T', 0.25);
        let bytes = frag.encode().unwrap();
        assert_eq!(Fragment::decode(&bytes).unwrap(), frag);
    }

    #[test]
    fn alignment_round_trips_with_partial_mask_bytes() {
        let aln = Alignment {
            edit_stop: 12,
            junc_start: 13,
            junc_end: 20,
            junc_len: 8,
            read_count: 2082,
            norm: 3.5,
            has_mutation: true,
            alt_editing: Some(1),
            grna_edit: bitvec![u8, Msb0; 1, 0, 1],
            grna_junc: bitvec![u8, Msb0; 0, 0, 0, 0, 0, 0, 0, 0, 1],
        };
        let bytes = aln.encode().unwrap();
        assert_eq!(Alignment::decode(&bytes).unwrap(), aln);
    }

    #[test]
    fn every_truncation_is_reported() {
        let bytes = template().encode().unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(Template::decode(&bytes[..cut]), Err(CodecError::Truncated { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Alignment::default().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            Alignment::decode(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn inconsistent_fragment_is_rejected() {
        let mut bytes = Vec::new();
        write_bytes(&mut bytes, b"bad", "name").unwrap();
        write_u32(&mut bytes, 1).unwrap();
        write_f64(&mut bytes, 1.0).unwrap();
        write_u8(&mut bytes, b'T').unwrap();
        write_bytes(&mut bytes, b"AC", "backbone").unwrap();
        write_counts(&mut bytes, &[0, 0], "edit_sites").unwrap();
        assert!(matches!(
            Fragment::decode(&bytes),
            Err(CodecError::Inconsistent(_))
        ));
    }

    #[test]
    fn negative_alt_index_other_than_none_is_invalid() {
        let mut bytes = Alignment::default().encode().unwrap();
        // Fixed header: 4 x u64, u32, f64, u8, then the alt byte.
        bytes[4 * 8 + 4 + 8 + 1] = 0xfe;
        assert!(matches!(
            Alignment::decode(&bytes),
            Err(CodecError::InvalidFlag { field: "alt_editing", .. })
        ));
    }
}
