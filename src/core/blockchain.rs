// This is the blockchain manager - it owns the block store and the tip and is the
// only place where the chain gets extended
// Blocks are produced in two phases: mine() fixes a header, then add_new_block()
// binds transactions and checks the stake lottery against that fixed hash

use crate::core::{BlockHeader, ExtendedBlock, ProofOfWork, StakeLottery, Transaction, UTXOSet};
use crate::error::{BlockchainError, Result};
use crate::storage::BlockStore;
use crate::wallet::address_to_pub_key_hash;
use data_encoding::HEXLOWER;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Clone)]
pub struct Blockchain {
    store: BlockStore,
    tip_hash: Arc<RwLock<Option<Vec<u8>>>>, // None while the chain is empty
    target_bits: u32,
    // one commit and one mining attempt at a time, shared by every clone
    commit_lock: Arc<Mutex<()>>,
    mining_lock: Arc<Mutex<()>>,
}

impl Blockchain {
    // When I want a chain with no blocks yet (a node that will sync from peers)
    pub fn create_empty(store: BlockStore, target_bits: u32) -> Result<Blockchain> {
        if store.get_tip_hash()?.is_some() {
            return Err(BlockchainError::Database(
                "Blockchain already exists".to_string(),
            ));
        }
        Ok(Self::with_tip(store, None, target_bits))
    }

    // When I want a brand new chain whose genesis pays `address`
    pub fn create_with_genesis(
        store: BlockStore,
        address: &str,
        target_bits: u32,
    ) -> Result<Blockchain> {
        let blockchain = Self::create_empty(store, target_bits)?;

        info!("Creating genesis block for address: {address}");
        let coinbase = Transaction::new_genesis_tx(address, "")?;
        let header = BlockHeader::new_genesis(address, target_bits)?;
        let genesis = ExtendedBlock::new(header, vec![coinbase], 0);
        blockchain.commit(&genesis)?;
        Ok(blockchain)
    }

    // When I want to reopen whatever the store already holds (possibly nothing)
    pub fn open(store: BlockStore, target_bits: u32) -> Result<Blockchain> {
        let tip = store.get_tip_hash()?;
        if let Some(hash) = &tip {
            if store.get_block(hash)?.is_none() {
                return Err(BlockchainError::Database(format!(
                    "Tip block {} is missing",
                    HEXLOWER.encode(hash)
                )));
            }
        }
        Ok(Self::with_tip(store, tip, target_bits))
    }

    fn with_tip(store: BlockStore, tip: Option<Vec<u8>>, target_bits: u32) -> Blockchain {
        Blockchain {
            store,
            tip_hash: Arc::new(RwLock::new(tip)),
            target_bits,
            commit_lock: Arc::new(Mutex::new(())),
            mining_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn get_store(&self) -> &BlockStore {
        &self.store
    }

    pub fn get_target_bits(&self) -> u32 {
        self.target_bits
    }

    pub fn get_tip_hash(&self) -> Option<Vec<u8>> {
        match self.tip_hash.read() {
            Ok(tip) => tip.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip = match self.tip_hash.write() {
            Ok(tip) => tip,
            Err(poisoned) => poisoned.into_inner(),
        };
        *tip = Some(new_tip_hash.to_vec());
    }

    fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Store, then mirror the store's tip decision in memory
    fn commit(&self, block: &ExtendedBlock) -> Result<bool> {
        let advanced = self.store.append(block)?;
        if advanced {
            self.set_tip_hash(block.get_hash());
            info!(
                "Tip advanced to {} at height {}",
                HEXLOWER.encode(block.get_hash()),
                block.get_height()
            );
        } else {
            info!(
                "Stored block {} at height {} without moving the tip",
                HEXLOWER.encode(block.get_hash()),
                block.get_height()
            );
        }
        Ok(advanced)
    }

    fn check_proof_of_work(&self, header: &BlockHeader) -> Result<()> {
        if header.get_difficulty() < self.target_bits || !ProofOfWork::validate(header) {
            return Err(BlockchainError::InvalidProofOfWork(header.get_hash_hex()));
        }
        Ok(())
    }

    /// Mines a header on top of the current tip. No transactions are attached yet.
    pub fn mine(&self, miner_address: &str) -> Result<BlockHeader> {
        let _mining = Self::lock(&self.mining_lock);
        let tip_hash = self.get_tip_hash().ok_or_else(|| {
            BlockchainError::InvalidBlock("Cannot mine on an empty chain".to_string())
        })?;
        let height = self.get_best_height()? + 1;
        BlockHeader::new_mined(tip_hash, height, miner_address, self.target_bits)
    }

    /// Second phase of block production: checks the header's work, runs the stake
    /// lottery for `stakeholder`, keeps the valid subset of `transactions` and
    /// stores the result.
    pub fn add_new_block(
        &self,
        header: BlockHeader,
        transactions: &[Transaction],
        stakeholder: &str,
    ) -> Result<ExtendedBlock> {
        let _commit = Self::lock(&self.commit_lock);
        self.check_proof_of_work(&header)?;

        let last_index = self.get_last_unit_index()?;
        let stake_index = StakeLottery::select_index(header.get_hash(), last_index);
        let pub_key_hash = address_to_pub_key_hash(stakeholder)?;
        let utxo_set = UTXOSet::new(self.clone());
        if !StakeLottery::validate(&utxo_set, &pub_key_hash, stake_index)? {
            warn!(
                "Rejecting block {}: {stakeholder} does not own unit {stake_index}",
                header.get_hash_hex()
            );
            return Err(BlockchainError::IneligibleStakeholder { index: stake_index });
        }

        let valid = self.filter_transactions(transactions, last_index)?;
        let block = ExtendedBlock::new(header, valid, stake_index);
        self.commit(&block)?;
        Ok(block)
    }

    /// Relay path for a block a peer already assembled. The lottery is not re-run
    /// here since the block's parent may not have arrived yet.
    pub fn add_block(&self, block: &ExtendedBlock) -> Result<bool> {
        let _commit = Self::lock(&self.commit_lock);
        self.check_proof_of_work(block.get_header())?;
        if !block.verify_commitment() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Stakeholder commitment mismatch in {}",
                HEXLOWER.encode(block.get_hash())
            )));
        }
        self.commit(block)
    }

    // Drops what cannot go into a block, one transaction at a time
    fn filter_transactions(
        &self,
        transactions: &[Transaction],
        last_index: u64,
    ) -> Result<Vec<Transaction>> {
        let mut valid = vec![];
        let mut coinbase_seen = false;
        let mut spent_in_batch: HashSet<(Vec<u8>, i64)> = HashSet::new();

        for tx in transactions {
            let id = tx.get_id_hex();
            if tx.is_coinbase() {
                if coinbase_seen || !tx.has_valid_id() || !tx.mints_from(last_index) {
                    warn!("Dropping coinbase {id}: it does not mint from unit {last_index}");
                    continue;
                }
                coinbase_seen = true;
                valid.push(tx.clone());
                continue;
            }

            if let Err(e) = self.check_spend(tx) {
                warn!("Dropping transaction {id}: {e}");
                continue;
            }

            let outpoints: Vec<(Vec<u8>, i64)> = tx
                .get_vin()
                .iter()
                .map(|vin| (vin.get_txid().to_vec(), vin.get_vout()))
                .collect();
            if outpoints.iter().any(|outpoint| spent_in_batch.contains(outpoint)) {
                warn!("Dropping transaction {id}: double spend within the block");
                continue;
            }
            spent_in_batch.extend(outpoints);
            valid.push(tx.clone());
        }
        Ok(valid)
    }

    fn check_spend(&self, tx: &Transaction) -> Result<()> {
        let prev_txs = self.previous_transactions(tx)?;
        if !tx.verify_with(&prev_txs) {
            return Err(BlockchainError::Transaction(
                "Signature verification failed".to_string(),
            ));
        }
        if !tx.conserves_units(&prev_txs) {
            return Err(BlockchainError::Transaction(
                "Outputs do not match the consumed units".to_string(),
            ));
        }
        for vin in tx.get_vin() {
            if self.is_output_spent(vin.get_txid(), vin.get_vout())? {
                return Err(BlockchainError::Transaction(format!(
                    "Output {}:{} is already spent",
                    vin.get_txid_hex(),
                    vin.get_vout()
                )));
            }
        }
        Ok(())
    }

    /// Previous transactions referenced by `tx`, keyed by hex id.
    pub fn previous_transactions(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for vin in tx.get_vin() {
            let txid_hex = vin.get_txid_hex();
            if prev_txs.contains_key(&txid_hex) {
                continue;
            }
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(txid_hex, prev_tx);
        }
        Ok(prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        tx.verify(self)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        tx.sign(self, pkcs8)
    }

    /// True if some transaction on the chain already consumes `txid:vout`.
    pub fn is_output_spent(&self, txid: &[u8], vout: i64) -> Result<bool> {
        for block in self.iterator() {
            for tx in block?.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                if tx
                    .get_vin()
                    .iter()
                    .any(|vin| vin.get_txid() == txid && vin.get_vout() == vout)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.store.clone())
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            for tx in block?.get_transactions() {
                if tx.get_id() == txid {
                    return Ok(tx.clone());
                }
            }
        }
        Err(BlockchainError::NotFound(format!(
            "Transaction {}",
            HEXLOWER.encode(txid)
        )))
    }

    /// Height of the tip, 0 for an empty chain.
    pub fn get_best_height(&self) -> Result<u64> {
        let Some(tip_hash) = self.get_tip_hash() else {
            return Ok(0);
        };
        let tip = self.store.get_block(&tip_hash)?.ok_or_else(|| {
            BlockchainError::NotFound(format!("Tip block {}", HEXLOWER.encode(&tip_hash)))
        })?;
        Ok(tip.get_height())
    }

    /// Next unit index to mint: one past the highest index minted by the nearest
    /// block that carries a coinbase.
    pub fn get_last_unit_index(&self) -> Result<u64> {
        for block in self.iterator() {
            if let Some(max_index) = block?.coinbase_max_index() {
                return Ok(max_index + 1);
            }
        }
        Ok(0)
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<ExtendedBlock>> {
        self.store.get_block(block_hash)
    }

    pub fn has_block(&self, block_hash: &[u8]) -> Result<bool> {
        self.store.contains(block_hash)
    }

    /// Hashes reachable from the tip, newest first. Stops quietly at a parent
    /// that has not been fetched yet.
    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let mut blocks = vec![];
        for block in self.iterator() {
            match block {
                Ok(block) => blocks.push(block.get_hash().to_vec()),
                Err(BlockchainError::NotFound(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(blocks)
    }
}

/// Read-only cursor from the tip back to genesis.
pub struct BlockchainIterator {
    store: BlockStore,
    current_hash: Option<Vec<u8>>,
}

impl BlockchainIterator {
    fn new(tip_hash: Option<Vec<u8>>, store: BlockStore) -> BlockchainIterator {
        BlockchainIterator {
            store,
            current_hash: tip_hash,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<ExtendedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        match self.store.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.get_pre_block_hash().is_empty() {
                    self.current_hash = Some(block.get_pre_block_hash().to_vec());
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(BlockchainError::NotFound(format!(
                "Block {}",
                HEXLOWER.encode(&hash)
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
