//! Peer-to-peer synchronization
//!
//! The framed wire messages, the list of known peers and the server that
//! drives the blockchain from network events: version handshake, inventory
//! exchange, block and transaction relay, and the two-phase mining hand-off.

pub mod message;
pub mod node;
pub mod server;

pub use message::{
    BlockPayload, GetBlocksPayload, GetDataPayload, InvPayload, Message, OpType, TxPayload,
    VersionPayload, COMMAND_LENGTH, NODE_VERSION,
};
pub use node::Nodes;
pub use server::{send_message, send_tx, Server};
