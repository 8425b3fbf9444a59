use crate::core::{Blockchain, TXOutput, Transaction, Units};
use crate::error::Result;
use std::collections::{HashMap, HashSet};

/// Unspent-output queries. Nothing is indexed: every call walks the chain from
/// tip to genesis and works out what is still unspent on the way.
pub struct UTXOSet {
    blockchain: Blockchain,
}

/// An output together with where it lives.
struct UnspentOutput {
    txid: Vec<u8>,
    index: usize,
    output: TXOutput,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    // Newest block first. All inputs of a block are recorded before its outputs
    // are looked at, so a spend inside the same block is still seen.
    fn unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentOutput>> {
        let mut spent: HashSet<(Vec<u8>, i64)> = HashSet::new();
        let mut unspent = vec![];

        for block in self.blockchain.iterator() {
            let block = block?;
            for tx in block.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin() {
                    spent.insert((vin.get_txid().to_vec(), vin.get_vout()));
                }
            }
            for tx in block.get_transactions() {
                for (index, out) in tx.get_vout().iter().enumerate() {
                    if !out.is_locked_with_key(pub_key_hash) {
                        continue;
                    }
                    if spent.contains(&(tx.get_id().to_vec(), index as i64)) {
                        continue;
                    }
                    unspent.push(UnspentOutput {
                        txid: tx.get_id().to_vec(),
                        index,
                        output: out.clone(),
                    });
                }
            }
        }
        Ok(unspent)
    }

    /// Transactions still holding at least one unspent output owned by `pub_key_hash`.
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        let wanted: HashSet<Vec<u8>> = self
            .unspent_outputs(pub_key_hash)?
            .into_iter()
            .map(|utxo| utxo.txid)
            .collect();

        let mut transactions = vec![];
        for block in self.blockchain.iterator() {
            for tx in block?.get_transactions() {
                if wanted.contains(tx.get_id()) {
                    transactions.push(tx.clone());
                }
            }
        }
        Ok(transactions)
    }

    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        Ok(self
            .unspent_outputs(pub_key_hash)?
            .into_iter()
            .map(|utxo| utxo.output)
            .collect())
    }

    /// Gathers outputs in walk order until at least `amount` units are collected.
    /// Returns the gathered units and, per hex txid, the output indices consumed.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(Units, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = Units::default();

        for utxo in self.unspent_outputs(pub_key_hash)? {
            if accumulated.len() >= amount {
                break;
            }
            accumulated.extend(utxo.output.get_units());
            unspent_outputs
                .entry(data_encoding::HEXLOWER.encode(&utxo.txid))
                .or_default()
                .push(utxo.index);
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(|out| out.get_value())
            .sum())
    }

    /// True if one of the owner's unspent outputs carries `index`.
    pub fn owns_unit(&self, pub_key_hash: &[u8], index: u64) -> Result<bool> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .any(|out| out.get_units().contains(index)))
    }
}
