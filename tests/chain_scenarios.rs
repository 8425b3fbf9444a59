//! End-to-end chain behaviour: transfers, rewards, fork choice and reopening a store

mod common;

use common::{mine_reward_block, new_chain, TEST_TARGET_BITS};
use stakecoin::{
    BlockStore, Blockchain, BlockchainError, ExtendedBlock, ProofOfWork, Result, Transaction,
    UTXOSet, Units, Wallet, SUBSIDY,
};
use std::collections::HashSet;
use tempfile::tempdir;

#[test]
fn test_send_mined_with_own_stake() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let bob = Wallet::new().unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    assert_eq!(utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(), SUBSIDY);

    let tx =
        Transaction::new_utxo_transaction(&alice, &bob.get_address(), 4, &utxo_set).unwrap();
    let last_index = blockchain.get_last_unit_index().unwrap();
    assert_eq!(last_index, SUBSIDY);
    let coinbase = Transaction::new_coinbase_tx(
        &alice.get_address(),
        &alice.get_address(),
        "",
        last_index,
    )
    .unwrap();
    let header = blockchain.mine(&alice.get_address()).unwrap();
    let block = blockchain
        .add_new_block(header, &[coinbase, tx], &alice.get_address())
        .unwrap();

    assert_eq!(block.get_height(), 2);
    assert_eq!(block.get_transactions().len(), 2);
    assert!(block.get_transactions()[0].is_coinbase());

    assert_eq!(utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(), 4);
    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        SUBSIDY - 4 + 2 * SUBSIDY
    );
    let bob_outputs = utxo_set.find_utxo(&bob.get_pub_key_hash()).unwrap();
    assert_eq!(bob_outputs.len(), 1);
    assert_eq!(bob_outputs[0].get_units(), &Units::range(0, 4));
    assert_eq!(blockchain.get_last_unit_index().unwrap(), 3 * SUBSIDY);
}

#[test]
fn test_replayed_transaction_is_dropped() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let bob = Wallet::new().unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    let tx =
        Transaction::new_utxo_transaction(&alice, &bob.get_address(), 3, &utxo_set).unwrap();

    let header = blockchain.mine(&alice.get_address()).unwrap();
    let first = blockchain
        .add_new_block(header, &[tx.clone()], &alice.get_address())
        .unwrap();
    assert_eq!(first.get_transactions().len(), 1);

    // both holders are candidates now that bob owns some units
    let header = blockchain.mine(&alice.get_address()).unwrap();
    let stakeholder = common::eligible_stakeholder(&blockchain, &header, &[&alice, &bob]);
    let replay = blockchain
        .add_new_block(header, &[tx], &stakeholder)
        .unwrap();
    assert!(replay.get_transactions().is_empty());

    assert_eq!(utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(), 3);
    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        SUBSIDY - 3
    );
}

#[test]
fn test_overspend_is_refused() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let bob = Wallet::new().unwrap();
    let utxo_set = UTXOSet::new(blockchain);

    let result =
        Transaction::new_utxo_transaction(&alice, &bob.get_address(), SUBSIDY + 1, &utxo_set);
    assert!(matches!(
        result,
        Err(BlockchainError::InsufficientFunds {
            required: 11,
            available: 10
        })
    ));
}

#[test]
fn test_equal_height_keeps_first_tip() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let address = alice.get_address();

    // two competing headers on the same parent
    let rival = Wallet::new().unwrap().get_address();
    let first = blockchain.mine(&address).unwrap();
    let second = blockchain.mine(&rival).unwrap();
    assert_eq!(first.get_height(), second.get_height());

    let first = blockchain.add_new_block(first, &[], &address).unwrap();
    assert_eq!(blockchain.get_tip_hash().unwrap(), first.get_hash());

    let second = blockchain.add_new_block(second, &[], &address).unwrap();
    assert!(blockchain.has_block(second.get_hash()).unwrap());
    assert_eq!(blockchain.get_tip_hash().unwrap(), first.get_hash());

    // a taller block moves the tip
    let third = blockchain.mine(&address).unwrap();
    assert_eq!(third.get_pre_block_hash(), first.get_hash());
    let third = blockchain.add_new_block(third, &[], &address).unwrap();
    assert_eq!(blockchain.get_tip_hash().unwrap(), third.get_hash());
    assert_eq!(blockchain.get_best_height().unwrap(), 3);
}

#[test]
fn test_duplicate_and_unworked_blocks_are_rejected() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let block = mine_reward_block(&blockchain, &[&alice]);

    assert!(matches!(
        blockchain.add_block(&block),
        Err(BlockchainError::DuplicateBlock(_))
    ));

    // a stricter chain does not accept headers mined for the test difficulty
    let store = BlockStore::temporary().unwrap();
    let strict = Blockchain::create_empty(store, TEST_TARGET_BITS + 8).unwrap();
    let err = strict.add_block(&block).unwrap_err();
    assert!(matches!(err, BlockchainError::InvalidProofOfWork(_)));
    assert!(err.is_rejection());
}

#[test]
fn test_minted_units_never_overlap() {
    let (blockchain, alice) = new_chain(BlockStore::temporary().unwrap());
    let bob = Wallet::new().unwrap();
    let utxo_set = UTXOSet::new(blockchain.clone());
    let tx =
        Transaction::new_utxo_transaction(&alice, &bob.get_address(), 5, &utxo_set).unwrap();
    let header = blockchain.mine(&alice.get_address()).unwrap();
    blockchain
        .add_new_block(header, &[tx], &alice.get_address())
        .unwrap();
    for _ in 0..4 {
        mine_reward_block(&blockchain, &[&alice, &bob]);
    }

    let blocks = blockchain
        .iterator()
        .collect::<Result<Vec<ExtendedBlock>>>()
        .unwrap();
    let mut minted = HashSet::new();
    let mut ceilings = vec![];
    for block in blocks.iter().rev() {
        assert!(ProofOfWork::validate(block.get_header()));
        assert!(block.verify_commitment());
        for tx in block.get_transactions().iter().filter(|tx| tx.is_coinbase()) {
            for output in tx.get_vout() {
                for index in output.get_units().iter() {
                    assert!(minted.insert(index), "unit {index} minted twice");
                }
            }
        }
        if let Some(max_index) = block.coinbase_max_index() {
            ceilings.push(max_index);
        }
    }
    assert!(ceilings.windows(2).all(|pair| pair[0] < pair[1]));

    // every minted unit is held by someone
    let total = utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap()
        + utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap();
    assert_eq!(total, minted.len() as u64);
    assert_eq!(total, blockchain.get_last_unit_index().unwrap());
}

#[test]
fn test_chain_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");

    let (tip, height, owner) = {
        let (blockchain, owner) = new_chain(BlockStore::open(&path).unwrap());
        mine_reward_block(&blockchain, &[&owner]);
        mine_reward_block(&blockchain, &[&owner]);
        blockchain.get_store().flush().unwrap();
        (
            blockchain.get_tip_hash().unwrap(),
            blockchain.get_best_height().unwrap(),
            owner,
        )
    };

    let blockchain = Blockchain::open(BlockStore::open(&path).unwrap(), TEST_TARGET_BITS).unwrap();
    assert_eq!(blockchain.get_tip_hash().unwrap(), tip);
    assert_eq!(blockchain.get_best_height().unwrap(), height);
    assert_eq!(blockchain.get_block_hashes().unwrap().len(), 3);

    let utxo_set = UTXOSet::new(blockchain.clone());
    assert_eq!(
        utxo_set.get_balance(&owner.get_pub_key_hash()).unwrap(),
        5 * SUBSIDY
    );

    let store = blockchain.get_store().clone();
    assert!(Blockchain::create_empty(store, TEST_TARGET_BITS).is_err());
}
