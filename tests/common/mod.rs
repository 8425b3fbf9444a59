//! Helpers shared by the integration tests

#![allow(dead_code)]

use stakecoin::{
    BlockHeader, BlockStore, Blockchain, ExtendedBlock, Message, StakeLottery, Transaction,
    UTXOSet, Wallet,
};
use std::io::{ErrorKind, Read};
use std::net::TcpListener;

pub const TEST_TARGET_BITS: u32 = 8;

pub fn new_chain(store: BlockStore) -> (Blockchain, Wallet) {
    let owner = Wallet::new().unwrap();
    let blockchain =
        Blockchain::create_with_genesis(store, &owner.get_address(), TEST_TARGET_BITS).unwrap();
    (blockchain, owner)
}

pub fn eligible_stakeholder(
    blockchain: &Blockchain,
    header: &BlockHeader,
    candidates: &[&Wallet],
) -> String {
    let last_index = blockchain.get_last_unit_index().unwrap();
    let index = StakeLottery::select_index(header.get_hash(), last_index);
    let utxo_set = UTXOSet::new(blockchain.clone());
    candidates
        .iter()
        .find(|wallet| {
            StakeLottery::validate(&utxo_set, &wallet.get_pub_key_hash(), index).unwrap()
        })
        .map(|wallet| wallet.get_address())
        .unwrap_or_else(|| panic!("no candidate owns unit {index}"))
}

/// One block with a coinbase, both rewards to whoever wins the lottery among `holders`.
pub fn mine_reward_block(blockchain: &Blockchain, holders: &[&Wallet]) -> ExtendedBlock {
    let header = blockchain.mine(&holders[0].get_address()).unwrap();
    let stakeholder = eligible_stakeholder(blockchain, &header, holders);
    let last_index = blockchain.get_last_unit_index().unwrap();
    let coinbase =
        Transaction::new_coinbase_tx(header.get_producer(), &stakeholder, "", last_index)
            .unwrap();
    blockchain
        .add_new_block(header, &[coinbase], &stakeholder)
        .unwrap()
}

pub fn fake_peer() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

pub fn next_message(listener: &TcpListener) -> Message {
    let (mut stream, _) = listener.accept().unwrap();
    let mut frame = vec![];
    stream.read_to_end(&mut frame).unwrap();
    Message::decode(&frame).unwrap()
}

pub fn assert_silent(listener: &TcpListener) {
    listener.set_nonblocking(true).unwrap();
    match listener.accept() {
        Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
        Ok(_) => panic!("unexpected message"),
    }
    listener.set_nonblocking(false).unwrap();
}
