// This file implements the transaction system - how units move between owners
// Outputs don't carry a bare amount: they carry the exact serial indices they hold,
// so the value of an output is simply how many units it owns

use crate::core::{Blockchain, UTXOSet, Units};
use crate::error::{BlockchainError, Result};
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key, validate_address, Wallet};
use data_encoding::HEXLOWER;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Units minted per reward. A regular coinbase pays this to the miner and the
/// same again to the stakeholder.
pub const SUBSIDY: u64 = 10;

/// Output index carried by the single input of a coinbase.
pub const COINBASE_VOUT: i64 = -1;

// A transaction input points at an output of an earlier transaction
// Think of it as "I want to spend output #2 from transaction ABC123"
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,      // empty for a coinbase
    vout: i64,          // COINBASE_VOUT for a coinbase
    signature: Vec<u8>, // never set on a coinbase
    pub_key: Vec<u8>,   // the spender's public key, or the memo on a coinbase
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout: vout as i64,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_txid_hex(&self) -> String {
        HEXLOWER.encode(&self.txid)
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    // I use this to check if this input was signed by the owner of a public key hash
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }

    // The output this input spends, as an index into the previous transaction's outputs
    fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }
}

// An output hands a set of units to whoever owns the locking public key hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    units: Units,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(units: Units, address: &str) -> Result<TXOutput> {
        if units.is_empty() {
            return Err(BlockchainError::Transaction(
                "Output must carry at least one unit".to_string(),
            ));
        }
        Ok(TXOutput {
            units,
            pub_key_hash: address_to_pub_key_hash(address)?,
        })
    }

    fn locked_to(units: Units, pub_key_hash: &[u8]) -> TXOutput {
        TXOutput {
            units,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    pub fn get_units(&self) -> &Units {
        &self.units
    }

    pub fn get_value(&self) -> u64 {
        self.units.len()
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

// This is the main transaction structure - a transfer of units between owners
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>, // hash of the transaction with this field cleared
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    // When a block is mined I pay SUBSIDY fresh units to the miner and SUBSIDY more
    // to the stakeholder, both taken from the range that starts at `last_index`
    pub fn new_coinbase_tx(
        miner: &str,
        stakeholder: &str,
        memo: &str,
        last_index: u64,
    ) -> Result<Transaction> {
        let outputs = if miner == stakeholder {
            vec![TXOutput::new(Units::range(last_index, 2 * SUBSIDY), miner)?]
        } else {
            vec![
                TXOutput::new(Units::range(last_index, SUBSIDY), miner)?,
                TXOutput::new(Units::range(last_index + SUBSIDY, SUBSIDY), stakeholder)?,
            ]
        };
        Self::coinbase_with_outputs(miner, memo, outputs)
    }

    // The genesis block has no lottery behind it, so it only mints the miner's share
    pub fn new_genesis_tx(address: &str, memo: &str) -> Result<Transaction> {
        let outputs = vec![TXOutput::new(Units::range(0, SUBSIDY), address)?];
        Self::coinbase_with_outputs(address, memo, outputs)
    }

    fn coinbase_with_outputs(
        miner: &str,
        memo: &str,
        outputs: Vec<TXOutput>,
    ) -> Result<Transaction> {
        let memo = if memo.is_empty() {
            format!("Reward to '{miner}'")
        } else {
            memo.to_string()
        };
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: memo.into_bytes(),
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Moves `amount` units from `wallet` to `to`. The destination gets the lowest
    /// indices of what was gathered and any rest comes back as change.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }

        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid to address: {to}"
            )));
        }

        let public_key_hash = wallet.get_pub_key_hash();
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;

        if accumulated.len() < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated.len(),
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                let mut input = TXInput::new(&txid, out);
                input.pub_key = wallet.get_public_key().to_vec();
                inputs.push(input);
            }
        }

        let (sent, change) = accumulated.split_at(amount);
        let mut outputs = vec![TXOutput::new(sent, to)?];
        if !change.is_empty() {
            outputs.push(TXOutput::locked_to(change, &public_key_hash));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        tx.sign(utxo_set.get_blockchain(), wallet.get_pkcs8())?;
        Ok(tx)
    }

    // Signatures cover a copy with every input stripped down to its outpoint
    fn trimmed_copy(&self) -> Transaction {
        Transaction {
            id: self.id.clone(),
            vin: self
                .vin
                .iter()
                .map(|input| TXInput {
                    txid: input.txid.clone(),
                    vout: input.vout,
                    signature: vec![],
                    pub_key: vec![],
                })
                .collect(),
            vout: self.vout.clone(),
        }
    }

    // The digest for input `idx`: the trimmed copy with that input's pub_key swapped
    // for the locking hash of the output it spends
    fn signing_digest(
        tx_copy: &mut Transaction,
        idx: usize,
        prev_tx: &Transaction,
        output_index: usize,
    ) -> Result<Vec<u8>> {
        let prev_out = prev_tx.vout.get(output_index).ok_or_else(|| {
            BlockchainError::Transaction(format!(
                "Output {output_index} missing from {}",
                HEXLOWER.encode(prev_tx.get_id())
            ))
        })?;
        tx_copy.vin[idx].pub_key = prev_out.pub_key_hash.clone();
        let digest = tx_copy.hash();
        tx_copy.vin[idx].pub_key = vec![];
        digest
    }

    pub fn sign(&mut self, blockchain: &Blockchain, pkcs8: &[u8]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        let prev_txs = blockchain.previous_transactions(self)?;
        self.sign_with(&prev_txs, pkcs8)
    }

    /// Signs every input against the previous transactions in `prev_txs`
    /// (keyed by hex id).
    pub fn sign_with(
        &mut self,
        prev_txs: &HashMap<String, Transaction>,
        pkcs8: &[u8],
    ) -> Result<()> {
        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = prev_txs.get(&vin.get_txid_hex()).ok_or_else(|| {
                BlockchainError::Transaction("Previous transaction not found".to_string())
            })?;
            let output_index = vin.output_index().ok_or_else(|| {
                BlockchainError::Transaction("Invalid output index".to_string())
            })?;
            let digest = Self::signing_digest(&mut tx_copy, idx, prev_tx, output_index)?;
            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, &digest)?;
        }
        Ok(())
    }

    pub fn verify(&self, blockchain: &Blockchain) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = blockchain.previous_transactions(self)?;
        Ok(self.verify_with(&prev_txs))
    }

    /// The id is not covered by the signatures, so it has to be rechecked
    /// against the content whenever a transaction arrives from outside.
    pub fn has_valid_id(&self) -> bool {
        match self.hash() {
            Ok(hash) => hash == self.id,
            Err(_) => false,
        }
    }

    /// Fail-closed: one bad input makes the whole transaction invalid.
    pub fn verify_with(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if !self.has_valid_id() {
            warn!("Transaction {} does not hash to its id", self.get_id_hex());
            return false;
        }
        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter().enumerate() {
            let Some(prev_tx) = prev_txs.get(&vin.get_txid_hex()) else {
                warn!("Input {idx} references an unknown transaction");
                return false;
            };
            let Some(output_index) = vin.output_index() else {
                return false;
            };
            // the signer must also be the owner of what is spent
            match prev_tx.vout.get(output_index) {
                Some(out) if vin.uses_key(out.get_pub_key_hash()) => {}
                _ => return false,
            }
            let digest = match Self::signing_digest(&mut tx_copy, idx, prev_tx, output_index) {
                Ok(digest) => digest,
                Err(_) => return false,
            };
            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                &digest,
            ) {
                return false;
            }
        }
        true
    }

    /// True when the outputs hand over exactly the units the inputs consume,
    /// each one once.
    pub fn conserves_units(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        let mut consumed = HashSet::new();
        let mut input_units = Units::default();
        let mut input_count = 0;
        for vin in &self.vin {
            if !consumed.insert((vin.txid.clone(), vin.vout)) {
                return false;
            }
            let Some(out) = prev_txs
                .get(&vin.get_txid_hex())
                .and_then(|prev| vin.output_index().and_then(|i| prev.vout.get(i)))
            else {
                return false;
            };
            input_count += out.units.len();
            input_units.extend(&out.units);
        }

        let mut output_units = Units::default();
        let mut output_count = 0;
        for out in &self.vout {
            output_count += out.units.len();
            output_units.extend(&out.units);
        }

        input_count == input_units.len()
            && output_count == output_units.len()
            && input_units == output_units
    }

    /// A coinbase is acceptable on top of `last_index` if it mints a contiguous
    /// run starting right there, with no overlap and at most two rewards.
    pub fn mints_from(&self, last_index: u64) -> bool {
        if !self.is_coinbase() {
            return false;
        }
        let mut minted = Units::default();
        let mut count = 0;
        for out in &self.vout {
            count += out.units.len();
            minted.extend(&out.units);
        }
        count > 0
            && count == minted.len()
            && count <= 2 * SUBSIDY
            && minted.is_contiguous_from(last_index)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize::<Transaction>(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> String {
        Wallet::new().unwrap().get_address()
    }

    // A signed spend of the whole genesis output, built without a chain
    fn spend_genesis(
        owner: &Wallet,
        to: &str,
        amount: u64,
    ) -> (Transaction, HashMap<String, Transaction>) {
        let genesis = Transaction::new_genesis_tx(&owner.get_address(), "").unwrap();
        let mut prev_txs = HashMap::new();
        prev_txs.insert(genesis.get_id_hex(), genesis.clone());

        let mut input = TXInput::new(genesis.get_id(), 0);
        input.pub_key = owner.get_public_key().to_vec();
        let (sent, change) = genesis.get_vout()[0].get_units().split_at(amount);
        let mut tx = Transaction {
            id: vec![],
            vin: vec![input],
            vout: vec![
                TXOutput::new(sent, to).unwrap(),
                TXOutput::locked_to(change, &owner.get_pub_key_hash()),
            ],
        };
        tx.id = tx.hash().unwrap();
        tx.sign_with(&prev_txs, owner.get_pkcs8()).unwrap();
        (tx, prev_txs)
    }

    #[test]
    fn test_coinbase_split_and_merge() {
        let miner = address();
        let stakeholder = address();

        let split = Transaction::new_coinbase_tx(&miner, &stakeholder, "", 30).unwrap();
        assert!(split.is_coinbase());
        assert_eq!(split.get_vout().len(), 2);
        assert_eq!(split.get_vout()[0].get_units(), &Units::range(30, SUBSIDY));
        assert_eq!(split.get_vout()[1].get_units(), &Units::range(40, SUBSIDY));
        assert!(split.mints_from(30));
        assert!(!split.mints_from(31));

        let merged = Transaction::new_coinbase_tx(&miner, &miner, "", 30).unwrap();
        assert_eq!(merged.get_vout().len(), 1);
        assert_eq!(merged.get_vout()[0].get_value(), 2 * SUBSIDY);
        assert_eq!(
            merged.get_vin()[0].get_pub_key(),
            format!("Reward to '{miner}'").as_bytes()
        );
    }

    #[test]
    fn test_genesis_mints_first_subsidy() {
        let tx = Transaction::new_genesis_tx(&address(), "hello").unwrap();
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_units(), &Units::range(0, SUBSIDY));
        assert_eq!(tx.get_vin()[0].get_pub_key(), b"hello");
        assert!(tx.mints_from(0));
    }

    #[test]
    fn test_sign_then_verify() {
        let owner = Wallet::new().unwrap();
        let (tx, prev_txs) = spend_genesis(&owner, &address(), 4);
        assert!(tx.verify_with(&prev_txs));
        assert!(tx.conserves_units(&prev_txs));
    }

    #[test]
    fn test_corrupted_signature_fails() {
        let owner = Wallet::new().unwrap();
        let (mut tx, prev_txs) = spend_genesis(&owner, &address(), 4);
        let last = tx.vin[0].signature.len() - 1;
        tx.vin[0].signature[last] ^= 0x01;
        assert!(!tx.verify_with(&prev_txs));
    }

    #[test]
    fn test_foreign_key_cannot_spend() {
        let owner = Wallet::new().unwrap();
        let thief = Wallet::new().unwrap();
        let (mut tx, prev_txs) = spend_genesis(&owner, &address(), 4);
        tx.vin[0].pub_key = thief.get_public_key().to_vec();
        tx.sign_with(&prev_txs, thief.get_pkcs8()).unwrap();
        assert!(!tx.verify_with(&prev_txs));
    }

    #[test]
    fn test_missing_previous_transaction_fails_closed() {
        let owner = Wallet::new().unwrap();
        let (tx, _) = spend_genesis(&owner, &address(), 4);
        assert!(!tx.verify_with(&HashMap::new()));
    }

    #[test]
    fn test_inflated_outputs_break_conservation() {
        let owner = Wallet::new().unwrap();
        let (mut tx, prev_txs) = spend_genesis(&owner, &address(), 4);
        tx.vout[1].units.extend(&Units::from_indices([99]));
        assert!(!tx.conserves_units(&prev_txs));
    }

    #[test]
    fn test_serialization_keeps_id() {
        let tx = Transaction::new_genesis_tx(&address(), "").unwrap();
        let decoded = Transaction::deserialize(&tx.serialize().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash().unwrap(), tx.get_id());
    }
}
