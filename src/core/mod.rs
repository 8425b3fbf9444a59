//! Core blockchain functionality
//!
//! Ledger entities (headers, extended blocks, transactions, unit sets), the
//! proof-of-work engine, the stake lottery, unspent-output queries and the
//! blockchain manager that ties them together.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod stake;
pub mod transaction;
pub mod units;
pub mod utxo_set;

pub use block::{BlockHeader, ExtendedBlock};
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::merkle_root;
pub use proof_of_work::{ProofOfWork, TARGET_BITS};
pub use stake::StakeLottery;
pub use transaction::{TXInput, TXOutput, Transaction, COINBASE_VOUT, SUBSIDY};
pub use units::Units;
pub use utxo_set::UTXOSet;
