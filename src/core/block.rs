use crate::core::{merkle_root, ProofOfWork, Transaction};
use crate::error::Result;
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// The mined part of a block. Mining produces a header on its own; transactions
/// and the stakeholder claim are bound afterwards, once the hash is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    pub(crate) timestamp: i64,
    pub(crate) pre_block_hash: Vec<u8>, // empty for genesis
    pub(crate) hash: Vec<u8>,
    pub(crate) nonce: u64,
    pub(crate) height: u64,
    pub(crate) producer: String,
    pub(crate) difficulty: u32,
}

impl BlockHeader {
    /// Builds a header on top of `pre_block_hash` and runs proof-of-work on it.
    pub fn new_mined(
        pre_block_hash: Vec<u8>,
        height: u64,
        producer: &str,
        difficulty: u32,
    ) -> Result<BlockHeader> {
        let mut header = BlockHeader {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            nonce: 0,
            height,
            producer: producer.to_string(),
            difficulty,
        };

        info!("Starting proof-of-work for header at height {height} with difficulty {difficulty}");
        let (nonce, hash) = ProofOfWork::new_proof_of_work(&header).run()?;
        header.nonce = nonce;
        header.hash = hash;
        Ok(header)
    }

    pub fn new_genesis(producer: &str, difficulty: u32) -> Result<BlockHeader> {
        BlockHeader::new_mined(vec![], 1, producer, difficulty)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<BlockHeader> {
        deserialize::<BlockHeader>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_producer(&self) -> &str {
        self.producer.as_str()
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }
}

/// A mined header together with the transactions that survived verification
/// and the stake lottery's result. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ExtendedBlock {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    stake_index: u64,
    stakeholder_hash: Vec<u8>,
}

impl ExtendedBlock {
    pub fn new(
        header: BlockHeader,
        transactions: Vec<Transaction>,
        stake_index: u64,
    ) -> ExtendedBlock {
        let stakeholder_hash = Self::commitment(header.get_hash(), stake_index, &transactions);
        ExtendedBlock {
            header,
            transactions,
            stake_index,
            stakeholder_hash,
        }
    }

    /// SHA256(hash ++ stake_index ++ merkle root of the transaction ids)
    fn commitment(hash: &[u8], stake_index: u64, transactions: &[Transaction]) -> Vec<u8> {
        let ids: Vec<Vec<u8>> = transactions.iter().map(|tx| tx.get_id().to_vec()).collect();
        let mut data = hash.to_vec();
        data.extend(stake_index.to_be_bytes());
        data.extend(merkle_root(&ids));
        sha256_digest(&data)
    }

    pub fn verify_commitment(&self) -> bool {
        Self::commitment(self.header.get_hash(), self.stake_index, &self.transactions)
            == self.stakeholder_hash
    }

    pub fn deserialize(bytes: &[u8]) -> Result<ExtendedBlock> {
        deserialize::<ExtendedBlock>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.header.get_hash()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.header.get_pre_block_hash()
    }

    pub fn get_height(&self) -> u64 {
        self.header.get_height()
    }

    pub fn get_stake_index(&self) -> u64 {
        self.stake_index
    }

    pub fn get_stakeholder_hash(&self) -> &[u8] {
        self.stakeholder_hash.as_slice()
    }

    /// Highest unit index minted by this block's coinbase, if it carries one.
    pub fn coinbase_max_index(&self) -> Option<u64> {
        self.transactions
            .iter()
            .filter(|tx| tx.is_coinbase())
            .flat_map(|tx| tx.get_vout().iter())
            .filter_map(|out| out.get_units().max_index())
            .max()
    }
}
