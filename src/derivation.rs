//! Program-derived addresses.
//!
//! An address is `sha256(seeds.. || bump || program_id || "ProgramDerivedAddress")`
//! and is only valid when it does not decode to an ed25519 curve point, so no
//! private key can exist for it. The search starts from bump 255 and walks
//! down until an off-curve hash is found.

use crate::error::{ClientError, Result};
use crate::types::RecordAddress;
use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

/// Maximum number of seeds, bump included.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Derive the address for `seeds` with an explicit bump already appended.
pub fn create_program_address(seeds: &[&[u8]], program_id: &RecordAddress) -> Result<RecordAddress> {
    validate_seeds(seeds, 0)?;
    let hash = hash_seeds(seeds, None, program_id);
    if is_on_curve(&hash) {
        return Err(ClientError::Derivation(
            "derived address lies on the ed25519 curve".to_string(),
        ));
    }
    Ok(RecordAddress(hash))
}

/// Find the highest bump yielding a valid address for `seeds`.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &RecordAddress,
) -> Result<(RecordAddress, u8)> {
    validate_seeds(seeds, 1)?;
    for bump in (0..=u8::MAX).rev() {
        let hash = hash_seeds(seeds, Some(bump), program_id);
        if !is_on_curve(&hash) {
            return Ok((RecordAddress(hash), bump));
        }
    }
    Err(ClientError::Derivation(format!(
        "no viable bump for program {program_id}"
    )))
}

fn validate_seeds(seeds: &[&[u8]], reserved: usize) -> Result<()> {
    if seeds.len() + reserved > MAX_SEEDS {
        return Err(ClientError::Derivation(format!(
            "too many seeds: {} (max {})",
            seeds.len() + reserved,
            MAX_SEEDS
        )));
    }
    if let Some(seed) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(ClientError::Derivation(format!(
            "seed of {} bytes exceeds {} bytes",
            seed.len(),
            MAX_SEED_LEN
        )));
    }
    Ok(())
}

fn hash_seeds(seeds: &[&[u8]], bump: Option<u8>, program_id: &RecordAddress) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    if let Some(bump) = bump {
        hasher.update([bump]);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    hasher.finalize().into()
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> RecordAddress {
        RecordAddress([42; 32])
    }

    #[test]
    fn test_find_is_deterministic() {
        let owner = RecordAddress([1; 32]);
        let seeds: &[&[u8]] = &[b"counter", owner.as_ref()];
        let first = find_program_address(seeds, &program()).unwrap();
        let second = find_program_address(seeds, &program()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_found_bump_recreates_address() {
        let owner = RecordAddress([3; 32]);
        let (address, bump) = find_program_address(&[b"counter", owner.as_ref()], &program()).unwrap();
        let recreated =
            create_program_address(&[b"counter", owner.as_ref(), &[bump]], &program()).unwrap();
        assert_eq!(address, recreated);
        assert!(!is_on_curve(address.as_bytes()));
    }

    #[test]
    fn test_found_bump_is_highest_viable() {
        let owner = RecordAddress([4; 32]);
        let seeds: &[&[u8]] = &[b"counter", owner.as_ref()];
        let (_, bump) = find_program_address(seeds, &program()).unwrap();
        for higher in bump.saturating_add(1)..=u8::MAX {
            if higher == bump {
                continue;
            }
            let result = create_program_address(&[seeds[0], seeds[1], &[higher]], &program());
            assert!(matches!(result, Err(ClientError::Derivation(_))));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = find_program_address(&[b"check", &1u64.to_le_bytes()], &program()).unwrap();
        let b = find_program_address(&[b"check", &2u64.to_le_bytes()], &program()).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn test_oversized_seed_rejected() {
        let long = [0u8; 33];
        let result = find_program_address(&[&long], &program());
        assert!(matches!(result, Err(ClientError::Derivation(_))));
    }

    #[test]
    fn test_too_many_seeds_rejected() {
        let seed: &[u8] = b"s";
        let seeds = vec![seed; MAX_SEEDS];
        assert!(find_program_address(&seeds, &program()).is_err());
    }
}
