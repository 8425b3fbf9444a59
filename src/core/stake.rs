//! Per-unit stake lottery
//!
//! Once a header is mined its hash picks one unit out of everything issued so
//! far. The block is only accepted if the claimed stakeholder currently owns
//! that unit, so producing blocks takes both work and a specific coin that
//! nobody could know about before the hash existed.

use crate::core::UTXOSet;
use crate::error::Result;
use crate::utils::sha256_digest;

/// Domain separator mixed into the lottery hash.
const STAKEHOLDER_DOMAIN: &[u8] = b"stakeholder";

pub struct StakeLottery;

impl StakeLottery {
    /// Maps `block_hash` onto `[0, last_index)`. Returns 0 when nothing has been
    /// issued yet, in which case no owner can pass [`StakeLottery::validate`].
    pub fn select_index(block_hash: &[u8], last_index: u64) -> u64 {
        if last_index == 0 {
            return 0;
        }
        let mut data = block_hash.to_vec();
        data.extend_from_slice(STAKEHOLDER_DOMAIN);
        let digest = sha256_digest(&data);

        let mut low = [0u8; 4];
        low.copy_from_slice(&digest[digest.len() - 4..]);
        let h = u32::from_be_bytes(low) as u128;

        // h < 2^32, so the product shifted back down is always below last_index
        ((h * last_index as u128) >> 32) as u64
    }

    /// True if `pub_key_hash` holds `index` in one of its unspent outputs.
    pub fn validate(utxo_set: &UTXOSet, pub_key_hash: &[u8], index: u64) -> Result<bool> {
        utxo_set.owns_unit(pub_key_hash, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_is_deterministic() {
        let hash = sha256_digest(b"some header");
        assert_eq!(
            StakeLottery::select_index(&hash, 1000),
            StakeLottery::select_index(&hash, 1000)
        );
    }

    #[test]
    fn test_selection_stays_in_range() {
        for seed in 0u32..500 {
            let hash = sha256_digest(&seed.to_be_bytes());
            for last_index in [1u64, 2, 10, 31, 1_000_000, u64::MAX] {
                assert!(StakeLottery::select_index(&hash, last_index) < last_index);
            }
        }
    }

    #[test]
    fn test_nothing_issued_selects_zero() {
        assert_eq!(StakeLottery::select_index(&[1, 2, 3], 0), 0);
    }

    #[test]
    fn test_selection_spreads_over_range() {
        let picks: std::collections::HashSet<u64> = (0u32..200)
            .map(|seed| StakeLottery::select_index(&sha256_digest(&seed.to_be_bytes()), 10))
            .collect();
        assert_eq!(picks.len(), 10);
    }
}
