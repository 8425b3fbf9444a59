//! Test utilities for blockchain testing

use crate::core::{BlockHeader, Blockchain, ExtendedBlock, ProofOfWork, StakeLottery, Transaction};
use crate::error::Result;
use crate::storage::BlockStore;
use crate::wallet::Wallet;

/// Low enough that a header is found after a few hundred hashes.
pub const TEST_TARGET_BITS: u32 = 8;

/// In-memory chain whose genesis pays the returned wallet.
pub fn new_test_chain() -> (Blockchain, Wallet) {
    let owner = Wallet::new().unwrap();
    let store = BlockStore::temporary().unwrap();
    let blockchain =
        Blockchain::create_with_genesis(store, &owner.get_address(), TEST_TARGET_BITS).unwrap();
    (blockchain, owner)
}

/// Address among `candidates` that owns the unit `header` draws in the lottery.
pub fn eligible_stakeholder(
    blockchain: &Blockchain,
    header: &BlockHeader,
    candidates: &[&Wallet],
) -> String {
    let last_index = blockchain.get_last_unit_index().unwrap();
    let index = StakeLottery::select_index(header.get_hash(), last_index);
    let utxo_set = crate::core::UTXOSet::new(blockchain.clone());
    candidates
        .iter()
        .find(|wallet| {
            StakeLottery::validate(&utxo_set, &wallet.get_pub_key_hash(), index).unwrap()
        })
        .map(|wallet| wallet.get_address())
        .unwrap_or_else(|| panic!("no candidate owns unit {index}"))
}

/// Mines `count` blocks with a coinbase each, all rewards to `miner`, which must
/// own every issued unit.
pub fn extend_chain(blockchain: &Blockchain, miner: &Wallet, count: usize) -> Vec<ExtendedBlock> {
    let address = miner.get_address();
    (0..count)
        .map(|_| {
            let last_index = blockchain.get_last_unit_index().unwrap();
            let coinbase =
                Transaction::new_coinbase_tx(&address, &address, "", last_index).unwrap();
            let header = blockchain.mine(&address).unwrap();
            blockchain.add_new_block(header, &[coinbase], &address).unwrap()
        })
        .collect()
}

/// Linkage, heights, work and commitments of every block from tip to genesis.
pub fn validate_chain_integrity(blockchain: &Blockchain) -> bool {
    let blocks = match blockchain.iterator().collect::<Result<Vec<ExtendedBlock>>>() {
        Ok(blocks) => blocks,
        Err(_) => return false,
    };
    for pair in blocks.windows(2) {
        let (child, parent) = (&pair[0], &pair[1]);
        if child.get_pre_block_hash() != parent.get_hash()
            || child.get_height() != parent.get_height() + 1
        {
            return false;
        }
    }
    blocks.last().map_or(true, |genesis| {
        genesis.get_header().is_genesis() && genesis.get_height() == 1
    }) && blocks
        .iter()
        .all(|block| ProofOfWork::validate(block.get_header()) && block.verify_commitment())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_chain_is_intact() {
        let (blockchain, miner) = new_test_chain();
        let blocks = extend_chain(&blockchain, &miner, 3);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blockchain.get_best_height().unwrap(), 4);
        assert!(validate_chain_integrity(&blockchain));
    }
}
