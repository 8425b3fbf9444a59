//! # Stakecoin - Proof of Work plus Proof of Stake
//!
//! My blockchain where every coin is a numbered unit and every block is
//! paid for twice: once by the miner's hash work, once by a stakeholder
//! who must own the unit a lottery picks out of the block hash.
//!
//! ## What I Built
//! - **Units, not amounts**: outputs carry the exact unit indices they own
//! - **Two-step blocks**: a mined header first, then the stakeholder extends it
//! - **Stake lottery**: SHA-256 of the header hash picks a unit index
//! - **Gossip network**: version / inv / getdata sync over plain TCP
//! - **Wallets**: ECDSA P-256 keys with Bitcoin-style base58 addresses
//!
//! ## How I Organized My Code
//! - `core/`: headers, extended blocks, units, transactions, mining, the lottery
//! - `storage/`: the sled block store and the in-memory pools
//! - `network/`: message framing, peers, the node server
//! - `wallet/`: key management and addresses
//! - `config/`: layered settings (defaults, TOML file, environment)
//! - `utils/`: hashing, signatures, base58, bincode helpers
//! - `cli/`: command-line parsing
//!
//! ## Things To Remember
//! - The tip only moves inside the same sled transaction that stores the block
//! - Relayed blocks are checked for work and commitment, not for the lottery
//! - Equal height never replaces the tip; the first block seen wins

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    merkle_root, BlockHeader, Blockchain, BlockchainIterator, ExtendedBlock, ProofOfWork,
    StakeLottery, TXInput, TXOutput, Transaction, UTXOSet, Units, COINBASE_VOUT, SUBSIDY,
    TARGET_BITS,
};
pub use error::{BlockchainError, Result};
pub use network::{
    send_message, send_tx, BlockPayload, GetBlocksPayload, GetDataPayload, InvPayload, Message,
    Nodes, OpType, Server, TxPayload, VersionPayload, COMMAND_LENGTH, NODE_VERSION,
};
pub use storage::{BlockInTransit, BlockStore, MemoryPool, TIP_BLOCK_HASH_KEY};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN, WALLET_FILE,
};
