//! Order-preserving composite keys.
//!
//! Layout: `gene 0x00 sample 0x00 replicate id`, with the replicate as one
//! byte and the id as a big-endian `u64`. Names never contain `0x00`, so
//! byte order groups by gene, then sample, then replicate, then id, and a
//! gene prefix can never match a longer gene name.

use std::fmt;

use crate::codec::CodecError;

const SEP: u8 = 0;

/// Whether `name` can be used as a gene or sample name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.as_bytes().contains(&SEP)
}

fn checked(name: &str) -> Result<&[u8], CodecError> {
    if is_valid_name(name) {
        Ok(name.as_bytes())
    } else {
        Err(CodecError::InvalidKey(format!("invalid name {name:?}")))
    }
}

/// Identity of one stored alignment and its fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentKey {
    /// Gene name.
    pub gene: String,
    /// Sample name.
    pub sample: String,
    /// Replicate number.
    pub replicate: u8,
    /// Per-sample sequence number, starting at 1.
    pub id: u64,
}

impl AlignmentKey {
    /// Encode into ordered key bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut key = replicate_prefix(&self.gene, &self.sample, self.replicate)?;
        key.extend_from_slice(&self.id.to_be_bytes());
        Ok(key)
    }

    /// Decode key bytes produced by [`AlignmentKey::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let invalid = |why: &str| CodecError::InvalidKey(why.to_string());

        let gene_end = bytes
            .iter()
            .position(|&b| b == SEP)
            .ok_or_else(|| invalid("missing gene separator"))?;
        let rest = &bytes[gene_end + 1..];
        let sample_end = rest
            .iter()
            .position(|&b| b == SEP)
            .ok_or_else(|| invalid("missing sample separator"))?;
        let tail = &rest[sample_end + 1..];
        if tail.len() != 9 {
            return Err(invalid("expected replicate and 8-byte id after sample"));
        }

        let gene = std::str::from_utf8(&bytes[..gene_end]).map_err(|_| invalid("gene is not UTF-8"))?;
        let sample =
            std::str::from_utf8(&rest[..sample_end]).map_err(|_| invalid("sample is not UTF-8"))?;
        if gene.is_empty() || sample.is_empty() {
            return Err(invalid("empty name"));
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&tail[1..]);
        Ok(Self {
            gene: gene.to_string(),
            sample: sample.to_string(),
            replicate: tail[0],
            id: u64::from_be_bytes(id),
        })
    }
}

impl fmt::Display for AlignmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.gene, self.sample, self.replicate, self.id)
    }
}

/// Prefix shared by every key of `gene`.
pub fn gene_prefix(gene: &str) -> Result<Vec<u8>, CodecError> {
    let mut key = checked(gene)?.to_vec();
    key.push(SEP);
    Ok(key)
}

/// Prefix shared by every key of one (gene, sample) namespace.
pub fn sample_prefix(gene: &str, sample: &str) -> Result<Vec<u8>, CodecError> {
    let mut key = gene_prefix(gene)?;
    key.extend_from_slice(checked(sample)?);
    key.push(SEP);
    Ok(key)
}

/// Prefix shared by every key of one (gene, sample, replicate).
pub fn replicate_prefix(gene: &str, sample: &str, replicate: u8) -> Result<Vec<u8>, CodecError> {
    let mut key = sample_prefix(gene, sample)?;
    key.push(replicate);
    Ok(key)
}
