//! Wire format
//!
//! Every connection carries exactly one frame: a 12-byte ASCII command tag,
//! zero padded, followed by a JSON payload. `ok` has no payload.

use crate::error::{BlockchainError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const COMMAND_LENGTH: usize = 12;
pub const NODE_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Block,
    Tx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionPayload {
    pub version: i64,
    pub best_height: u64,
    pub addr_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetBlocksPayload {
    pub addr_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvPayload {
    pub addr_from: String,
    #[serde(rename = "Type")]
    pub op_type: OpType,
    pub items: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDataPayload {
    pub addr_from: String,
    #[serde(rename = "Type")]
    pub op_type: OpType,
    #[serde(rename = "ID")]
    pub id: Vec<u8>,
}

/// Carries a serialized ExtendedBlock for `block`, a serialized BlockHeader for `newblock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockPayload {
    pub addr_from: String,
    pub block: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxPayload {
    pub add_from: String,
    pub transaction: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionPayload),
    GetBlocks(GetBlocksPayload),
    Inv(InvPayload),
    GetData(GetDataPayload),
    Block(BlockPayload),
    NewBlock(BlockPayload),
    Tx(TxPayload),
    Ok,
}

impl Message {
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::GetBlocks(_) => "getblocks",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::Block(_) => "block",
            Message::NewBlock(_) => "newblock",
            Message::Tx(_) => "tx",
            Message::Ok => "ok",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut frame = command_to_bytes(self.command()).to_vec();
        let payload = match self {
            Message::Version(payload) => serde_json::to_vec(payload)?,
            Message::GetBlocks(payload) => serde_json::to_vec(payload)?,
            Message::Inv(payload) => serde_json::to_vec(payload)?,
            Message::GetData(payload) => serde_json::to_vec(payload)?,
            Message::Block(payload) | Message::NewBlock(payload) => serde_json::to_vec(payload)?,
            Message::Tx(payload) => serde_json::to_vec(payload)?,
            Message::Ok => vec![],
        };
        frame.extend(payload);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Message> {
        if frame.len() < COMMAND_LENGTH {
            return Err(BlockchainError::Protocol(format!(
                "Frame of {} bytes is shorter than the command tag",
                frame.len()
            )));
        }
        let (tag, payload) = frame.split_at(COMMAND_LENGTH);
        let command = bytes_to_command(tag)?;
        let message = match command.as_str() {
            "version" => Message::Version(parse(payload)?),
            "getblocks" => Message::GetBlocks(parse(payload)?),
            "inv" => Message::Inv(parse(payload)?),
            "getdata" => Message::GetData(parse(payload)?),
            "block" => Message::Block(parse(payload)?),
            "newblock" => Message::NewBlock(parse(payload)?),
            "tx" => Message::Tx(parse(payload)?),
            "ok" => Message::Ok,
            other => {
                return Err(BlockchainError::Protocol(format!(
                    "Unknown command '{other}'"
                )))
            }
        };
        Ok(message)
    }
}

fn parse<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

fn command_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    let mut bytes = [0u8; COMMAND_LENGTH];
    for (slot, byte) in bytes.iter_mut().zip(command.as_bytes()) {
        *slot = *byte;
    }
    bytes
}

fn bytes_to_command(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let command = &bytes[..end];
    if !command.is_ascii() || bytes[end..].iter().any(|b| *b != 0) {
        return Err(BlockchainError::Protocol(
            "Malformed command tag".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(command).into_owned())
}
