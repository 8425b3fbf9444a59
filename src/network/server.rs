use crate::config::Config;
use crate::core::{BlockHeader, Blockchain, ExtendedBlock, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::message::{
    BlockPayload, GetBlocksPayload, GetDataPayload, InvPayload, Message, OpType, TxPayload,
    VersionPayload, NODE_VERSION,
};
use crate::network::Nodes;
use crate::storage::{BlockInTransit, MemoryPool};
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

/// One node of the gossip network. Connections are served one at a time: each
/// is read to the end, dispatched once and closed. There are no socket
/// timeouts, so a peer that never finishes its frame holds up the whole node.
pub struct Server {
    blockchain: Blockchain,
    node_addr: String,
    bootstrap_addr: String,
    mining_addr: Option<String>,
    stake_addr: Option<String>,
    tx_threshold: usize,
    mining_interval: Duration,
    known_nodes: Nodes,
    mempool: MemoryPool,
    blocks_in_transit: BlockInTransit,
}

impl Server {
    pub fn new(blockchain: Blockchain, config: &Config) -> Result<Server> {
        let node_addr = config.get_node_addr();
        let bootstrap_addr = config.get_bootstrap_addr();
        let known_nodes = Nodes::new();
        if bootstrap_addr != node_addr {
            known_nodes.add_node(&bootstrap_addr);
        }
        Ok(Server {
            blockchain,
            node_addr,
            bootstrap_addr,
            mining_addr: config.get_mining_addr(),
            stake_addr: config.get_stake_addr(),
            tx_threshold: config.get_tx_threshold()?,
            mining_interval: config.get_mining_interval()?,
            known_nodes,
            mempool: MemoryPool::new(),
            blocks_in_transit: BlockInTransit::new(),
        })
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn get_mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    pub fn get_known_nodes(&self) -> &Nodes {
        &self.known_nodes
    }

    pub fn get_blocks_in_transit(&self) -> &BlockInTransit {
        &self.blocks_in_transit
    }

    fn is_bootstrap(&self) -> bool {
        self.node_addr == self.bootstrap_addr
    }

    /// Announces itself to the bootstrap node, then serves forever. A mining node
    /// mines and announces one header before every connection it serves.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.node_addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {}: {e}", self.node_addr))
        })?;
        info!("Server listening on {}", self.node_addr);

        if !self.is_bootstrap() {
            self.send_version(&self.bootstrap_addr)?;
        }

        loop {
            if let Some(miner) = &self.mining_addr {
                if self.blockchain.get_tip_hash().is_some() {
                    if let Err(e) = self.mine_and_announce(miner) {
                        error!("Mining attempt failed: {e}");
                    }
                }
            }
            self.serve_one(&listener)?;
            if self.mining_addr.is_some() {
                thread::sleep(self.mining_interval);
            }
        }
    }

    /// Accepts and fully handles one connection. Only a failing listener is an
    /// error here; whatever goes wrong inside the connection is logged.
    pub fn serve_one(&self, listener: &TcpListener) -> Result<()> {
        let (stream, peer) = listener
            .accept()
            .map_err(|e| BlockchainError::Network(format!("Failed to accept connection: {e}")))?;
        if let Err(e) = self.handle_connection(stream) {
            error!("Error handling connection from {peer}: {e}");
        }
        Ok(())
    }

    pub fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let mut frame = vec![];
        stream.read_to_end(&mut frame)?;
        let message = Message::decode(&frame)?;
        self.process_message(message)
    }

    pub fn process_message(&self, message: Message) -> Result<()> {
        info!("Received {} command", message.command());
        match message {
            Message::Version(payload) => self.handle_version(payload),
            Message::GetBlocks(payload) => self.handle_get_blocks(payload),
            Message::Inv(payload) => self.handle_inv(payload),
            Message::GetData(payload) => self.handle_get_data(payload),
            Message::Block(payload) => self.handle_block(payload),
            Message::NewBlock(payload) => self.handle_new_block(payload),
            Message::Tx(payload) => self.handle_tx(payload),
            Message::Ok => Ok(()),
        }
    }

    fn handle_version(&self, payload: VersionPayload) -> Result<()> {
        let local_height = self.blockchain.get_best_height()?;
        let remote_height = payload.best_height;
        info!(
            "Peer {} is at height {remote_height}, local height {local_height}",
            payload.addr_from
        );

        if local_height < remote_height {
            self.send_get_blocks(&payload.addr_from)?;
        } else if local_height > remote_height {
            self.send_version(&payload.addr_from)?;
        } else {
            self.send_ok(&payload.addr_from)?;
        }

        if !self.known_nodes.node_is_known(&payload.addr_from) {
            self.known_nodes.add_node(&payload.addr_from);
        }
        Ok(())
    }

    fn handle_get_blocks(&self, payload: GetBlocksPayload) -> Result<()> {
        let hashes = self.blockchain.get_block_hashes()?;
        self.send_inv(&payload.addr_from, OpType::Block, hashes)
    }

    fn handle_inv(&self, payload: InvPayload) -> Result<()> {
        info!(
            "Peer {} announced {} {:?} item(s)",
            payload.addr_from,
            payload.items.len(),
            payload.op_type
        );
        match payload.op_type {
            OpType::Block => {
                let mut wanted = vec![];
                for hash in payload.items {
                    if !self.blockchain.has_block(&hash)? {
                        wanted.push(hash);
                    }
                }
                self.blocks_in_transit.replace(wanted);
                if let Some(hash) = self.blocks_in_transit.pop_front() {
                    self.send_get_data(&payload.addr_from, OpType::Block, &hash)?;
                }
            }
            OpType::Tx => {
                if let Some(txid) = payload.items.first() {
                    if !self.mempool.contains(&HEXLOWER.encode(txid)) {
                        self.send_get_data(&payload.addr_from, OpType::Tx, txid)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_get_data(&self, payload: GetDataPayload) -> Result<()> {
        let id_hex = HEXLOWER.encode(&payload.id);
        match payload.op_type {
            OpType::Block => match self.blockchain.get_block(&payload.id)? {
                Some(block) => self.send_block(&payload.addr_from, &block)?,
                None => warn!("Requested block {id_hex} is not stored"),
            },
            OpType::Tx => match self.mempool.get(&id_hex) {
                Some(tx) => self.send_tx(&payload.addr_from, &tx)?,
                None => warn!("Requested transaction {id_hex} is not pooled"),
            },
        }
        Ok(())
    }

    fn handle_block(&self, payload: BlockPayload) -> Result<()> {
        let block = ExtendedBlock::deserialize(&payload.block)?;
        let hash = HEXLOWER.encode(block.get_hash());

        match self.blockchain.add_block(&block) {
            Ok(_) => {
                info!("Added block {hash} from {}", payload.addr_from);
                self.mempool.remove_all(block.get_transactions());
            }
            Err(e) if e.is_rejection() => warn!("Rejected block {hash}: {e}"),
            Err(e) => error!("Failed to store block {hash}: {e}"),
        }

        // fetch the next announced block whatever happened to this one
        if let Some(next) = self.blocks_in_transit.pop_front() {
            self.send_get_data(&payload.addr_from, OpType::Block, &next)?;
        }
        Ok(())
    }

    // A miner found a header; as stakeholder I try to turn it into a block
    fn handle_new_block(&self, payload: BlockPayload) -> Result<()> {
        let header = BlockHeader::deserialize(&payload.block)?;
        let Some(stakeholder) = self.stake_addr.clone() else {
            return self.send_ok(&payload.addr_from);
        };
        if self.mempool.len() < self.tx_threshold {
            return self.send_ok(&payload.addr_from);
        }

        let txs = self.verified_mempool();
        if txs.is_empty() {
            info!("No valid pending transactions for header {}", header.get_hash_hex());
            return self.send_ok(&payload.addr_from);
        }

        let last_index = self.blockchain.get_last_unit_index()?;
        let coinbase =
            Transaction::new_coinbase_tx(header.get_producer(), &stakeholder, "", last_index)?;
        let mut batch = vec![coinbase];
        batch.extend(txs.iter().cloned());

        match self.blockchain.add_new_block(header, &batch, &stakeholder) {
            Ok(block) => {
                self.mempool.remove_all(&txs);
                self.broadcast_block(&block)
            }
            Err(e) if e.is_rejection() => {
                warn!("Header from {} not accepted: {e}", payload.addr_from);
                self.send_ok(&payload.addr_from)
            }
            Err(e) => Err(e),
        }
    }

    fn handle_tx(&self, payload: TxPayload) -> Result<()> {
        let tx = Transaction::deserialize(&payload.transaction)?;
        if !tx.has_valid_id() {
            return Err(BlockchainError::Transaction(format!(
                "Transaction {} from {} does not hash to its id",
                tx.get_id_hex(),
                payload.add_from
            )));
        }
        let txid = tx.get_id().to_vec();
        info!("Pooled transaction {} from {}", tx.get_id_hex(), payload.add_from);
        self.mempool.add(tx);

        if self.is_bootstrap() {
            for node in self.known_nodes.get_nodes() {
                if node != self.node_addr && node != payload.add_from {
                    self.send_inv(&node, OpType::Tx, vec![txid.clone()])?;
                }
            }
            if self.mempool.len() < self.tx_threshold {
                return Ok(());
            }
        }

        if self.mempool.len() >= self.tx_threshold {
            if let Some(miner) = self.mining_addr.clone() {
                self.mine_mempool(&miner)?;
            }
        }
        Ok(())
    }

    // Drops anything from the pool that no longer verifies and returns the rest
    fn verified_mempool(&self) -> Vec<Transaction> {
        let mut valid = vec![];
        for tx in self.mempool.get_all() {
            match self.blockchain.verify_transaction(&tx) {
                Ok(true) => valid.push(tx),
                Ok(false) => {
                    warn!("Evicting transaction {}: invalid signature", tx.get_id_hex());
                    self.mempool.remove(&tx.get_id_hex());
                }
                Err(e) => {
                    warn!("Evicting transaction {}: {e}", tx.get_id_hex());
                    self.mempool.remove(&tx.get_id_hex());
                }
            }
        }
        valid
    }

    fn mine_mempool(&self, miner: &str) -> Result<()> {
        let stakeholder = self.stake_addr.clone().unwrap_or_else(|| miner.to_string());

        while !self.mempool.is_empty() {
            let txs = self.verified_mempool();
            if txs.is_empty() {
                info!("All pending transactions were invalid");
                break;
            }

            let last_index = self.blockchain.get_last_unit_index()?;
            let coinbase = Transaction::new_coinbase_tx(miner, &stakeholder, "", last_index)?;
            let mut batch = vec![coinbase];
            batch.extend(txs.iter().cloned());

            let header = self.blockchain.mine(miner)?;
            match self.blockchain.add_new_block(header, &batch, &stakeholder) {
                Ok(block) => {
                    // whatever assembly dropped is gone for good too
                    self.mempool.remove_all(&txs);
                    info!(
                        "New block {} mined with {} transaction(s)",
                        HEXLOWER.encode(block.get_hash()),
                        block.get_transactions().len()
                    );
                    self.broadcast_block(&block)?;
                }
                Err(e) if e.is_rejection() => {
                    warn!("Mined block not accepted: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Mines one header on the current tip and offers it to every known node.
    pub fn mine_and_announce(&self, miner: &str) -> Result<()> {
        let header = self.blockchain.mine(miner)?;
        let data = header.serialize()?;
        for node in self.known_nodes.get_nodes() {
            if node != self.node_addr {
                self.send_new_block(&node, data.clone())?;
            }
        }
        Ok(())
    }

    fn broadcast_block(&self, block: &ExtendedBlock) -> Result<()> {
        for node in self.known_nodes.get_nodes() {
            if node != self.node_addr {
                self.send_inv(&node, OpType::Block, vec![block.get_hash().to_vec()])?;
            }
        }
        Ok(())
    }

    fn send_version(&self, addr: &str) -> Result<()> {
        let height = self.blockchain.get_best_height()?;
        let best_height = height.saturating_sub(self.blocks_in_transit.len() as u64);
        self.send_data(
            addr,
            &Message::Version(VersionPayload {
                version: NODE_VERSION,
                best_height,
                addr_from: self.node_addr.clone(),
            }),
        )
    }

    fn send_get_blocks(&self, addr: &str) -> Result<()> {
        self.send_data(
            addr,
            &Message::GetBlocks(GetBlocksPayload {
                addr_from: self.node_addr.clone(),
            }),
        )
    }

    fn send_inv(&self, addr: &str, op_type: OpType, items: Vec<Vec<u8>>) -> Result<()> {
        self.send_data(
            addr,
            &Message::Inv(InvPayload {
                addr_from: self.node_addr.clone(),
                op_type,
                items,
            }),
        )
    }

    fn send_get_data(&self, addr: &str, op_type: OpType, id: &[u8]) -> Result<()> {
        self.send_data(
            addr,
            &Message::GetData(GetDataPayload {
                addr_from: self.node_addr.clone(),
                op_type,
                id: id.to_vec(),
            }),
        )
    }

    fn send_block(&self, addr: &str, block: &ExtendedBlock) -> Result<()> {
        self.send_data(
            addr,
            &Message::Block(BlockPayload {
                addr_from: self.node_addr.clone(),
                block: block.serialize()?,
            }),
        )
    }

    fn send_new_block(&self, addr: &str, header: Vec<u8>) -> Result<()> {
        self.send_data(
            addr,
            &Message::NewBlock(BlockPayload {
                addr_from: self.node_addr.clone(),
                block: header,
            }),
        )
    }

    fn send_tx(&self, addr: &str, tx: &Transaction) -> Result<()> {
        self.send_data(
            addr,
            &Message::Tx(TxPayload {
                add_from: self.node_addr.clone(),
                transaction: tx.serialize()?,
            }),
        )
    }

    fn send_ok(&self, addr: &str) -> Result<()> {
        self.send_data(addr, &Message::Ok)
    }

    // A peer we cannot reach is forgotten rather than failing the handler
    fn send_data(&self, addr: &str, message: &Message) -> Result<()> {
        match send_message(addr, message) {
            Err(BlockchainError::Network(e)) => {
                warn!("Peer {addr} is not reachable, removing it: {e}");
                self.known_nodes.evict_node(addr);
                Ok(())
            }
            other => other,
        }
    }
}

/// Opens a connection to `addr`, writes one frame and closes the write half.
pub fn send_message(addr: &str, message: &Message) -> Result<()> {
    let frame = message.encode()?;
    info!("Sending {} to {addr}", message.command());

    let mut stream = TcpStream::connect(addr)
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .write_all(&frame)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| BlockchainError::Network(format!("Failed to close connection: {e}")))?;
    Ok(())
}

/// Hands a transaction to `addr` on behalf of a node listening at `from_addr`.
pub fn send_tx(from_addr: &str, addr: &str, tx: &Transaction) -> Result<()> {
    send_message(
        addr,
        &Message::Tx(TxPayload {
            add_from: from_addr.to_string(),
            transaction: tx.serialize()?,
        }),
    )
}
