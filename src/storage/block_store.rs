use crate::core::ExtendedBlock;
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::debug;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Tree};
use std::path::Path;

/// Key holding the hash of the current tip.
pub const TIP_BLOCK_HASH_KEY: &str = "l";
const BLOCKS_TREE: &str = "blocks";

/// Block bucket: hash -> serialized ExtendedBlock, plus the tip sentinel.
/// Cloning is cheap and every clone shares the same database.
#[derive(Clone)]
pub struct BlockStore {
    db: Db,
    blocks: Tree,
}

impl BlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<BlockStore> {
        let db = sled::open(path.as_ref())
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Self::with_db(db)
    }

    /// In-memory store, dropped with the last handle.
    pub fn temporary() -> Result<BlockStore> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Self::with_db(db)
    }

    fn with_db(db: Db) -> Result<BlockStore> {
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok(BlockStore { db, blocks })
    }

    pub fn get_tip_hash(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.get(TIP_BLOCK_HASH_KEY)?.map(|tip| tip.to_vec()))
    }

    pub fn get_block(&self, hash: &[u8]) -> Result<Option<ExtendedBlock>> {
        match self.blocks.get(hash)? {
            Some(bytes) => Ok(Some(ExtendedBlock::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, hash: &[u8]) -> Result<bool> {
        Ok(self.blocks.contains_key(hash)?)
    }

    /// Stores `block` and, in the same transaction, moves the tip onto it when
    /// there is no tip yet or the block is strictly higher than the tip.
    /// Returns whether the tip moved.
    pub fn append(&self, block: &ExtendedBlock) -> Result<bool> {
        let hash = block.get_hash().to_vec();
        let height = block.get_height();
        let data = block.serialize()?;

        let result = self
            .blocks
            .transaction(|tx_db| -> ConflictableTransactionResult<bool, BlockchainError> {
                if tx_db.get(hash.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        BlockchainError::DuplicateBlock(HEXLOWER.encode(&hash)),
                    ));
                }
                tx_db.insert(hash.as_slice(), data.as_slice())?;

                let advance = match tx_db.get(TIP_BLOCK_HASH_KEY)? {
                    None => true,
                    Some(tip_hash) => {
                        let tip_bytes = tx_db.get(tip_hash.as_ref())?.ok_or_else(|| {
                            ConflictableTransactionError::Abort(BlockchainError::Database(
                                "Tip block is missing".to_string(),
                            ))
                        })?;
                        let tip = ExtendedBlock::deserialize(tip_bytes.as_ref())
                            .map_err(ConflictableTransactionError::Abort)?;
                        height > tip.get_height()
                    }
                };
                if advance {
                    tx_db.insert(TIP_BLOCK_HASH_KEY, hash.as_slice())?;
                }
                Ok(advance)
            });

        match result {
            Ok(advanced) => {
                debug!("Stored block {} (tip moved: {advanced})", HEXLOWER.encode(&hash));
                Ok(advanced)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// Every stored block hash, in key order.
    pub fn block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let mut hashes = vec![];
        for item in self.blocks.iter() {
            let (key, _) = item?;
            if key.as_ref() != TIP_BLOCK_HASH_KEY.as_bytes() {
                hashes.push(key.to_vec());
            }
        }
        Ok(hashes)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
