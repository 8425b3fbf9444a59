//! Wallet management
//!
//! Key pairs, address encoding and the local wallet file. The chain itself only
//! ever sees public-key hashes extracted from addresses.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::{Wallets, WALLET_FILE};
