use crate::core::BlockHeader;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Default number of leading zero bits a header hash must carry.
pub const TARGET_BITS: u32 = 16;

const MAX_NONCE: u64 = u64::MAX;

pub struct ProofOfWork<'a> {
    header: &'a BlockHeader,
    target: BigInt,
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(header: &'a BlockHeader) -> ProofOfWork<'a> {
        ProofOfWork {
            header,
            target: Self::target_for(header.get_difficulty()),
        }
    }

    // 2^(256 - bits); a difficulty outside 1..=255 gets a zero target nothing can meet
    fn target_for(bits: u32) -> BigInt {
        if bits == 0 || bits > 255 {
            return BigInt::from(0);
        }
        let mut target = BigInt::from(1);
        target.shl_assign(256 - bits);
        target
    }

    /// Recomputes the hash from the stored nonce. The header is valid only if the
    /// result is below target and is exactly the hash the header carries.
    pub fn validate(header: &BlockHeader) -> bool {
        let pow = ProofOfWork::new_proof_of_work(header);
        let hash = sha256_digest(pow.prepare_data(header.get_nonce()).as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash_int < pow.target && hash.as_slice() == header.get_hash()
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.header.get_pre_block_hash());
        data_bytes.extend(self.header.get_timestamp().to_be_bytes());
        data_bytes.extend(self.header.get_height().to_be_bytes());
        data_bytes.extend(self.header.get_producer().as_bytes());
        data_bytes.extend(self.header.get_difficulty().to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    /// Searches nonces from zero and returns the first one whose hash is below target.
    pub fn run(&self) -> Result<(u64, Vec<u8>)> {
        if self.target == BigInt::from(0) {
            return Err(BlockchainError::Mining(format!(
                "Unsupported difficulty {}",
                self.header.get_difficulty()
            )));
        }
        debug!(
            "Mining header at height {} with difficulty {}",
            self.header.get_height(),
            self.header.get_difficulty()
        );
        let mut nonce = 0;
        loop {
            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
            if hash_int < self.target {
                info!("Found hash {} at nonce {nonce}", HEXLOWER.encode(&hash));
                return Ok((nonce, hash));
            }
            if nonce == MAX_NONCE {
                return Err(BlockchainError::Mining(
                    "Nonce space exhausted".to_string(),
                ));
            }
            nonce += 1;
        }
    }
}
