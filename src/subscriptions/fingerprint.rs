//! Order-independent keys for program-account queries.

use crate::types::{RecordAddress, RecordFilter};
use std::fmt;

/// Canonical text form of a program id plus filter set.
///
/// Layout: `programId:<b58>` then `+dataSize:<n>` per size filter in
/// ascending order, then `+memcmp:<offset>:<b58 bytes>` per pattern filter
/// ordered by offset and then bytes. Duplicate filters collapse. Base58 never
/// produces `+` or `:`, so distinct filter sets never share a fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterFingerprint(String);

impl FilterFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl fmt::Display for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a program-account query.
pub fn fingerprint(program_id: &RecordAddress, filters: &[RecordFilter]) -> FilterFingerprint {
    let mut sizes: Vec<u64> = Vec::new();
    let mut patterns: Vec<(usize, &[u8])> = Vec::new();

    for filter in filters {
        match filter {
            RecordFilter::DataSize(size) => sizes.push(*size),
            RecordFilter::Memcmp { offset, bytes } => patterns.push((*offset, bytes.as_slice())),
        }
    }

    sizes.sort_unstable();
    sizes.dedup();
    patterns.sort_unstable();
    patterns.dedup();

    let mut out = format!("programId:{}", program_id.to_base58());
    for size in sizes {
        out.push_str(&format!("+dataSize:{size}"));
    }
    for (offset, bytes) in patterns {
        out.push_str(&format!(
            "+memcmp:{offset}:{}",
            bs58::encode(bytes).into_string()
        ));
    }

    FilterFingerprint(out)
}
