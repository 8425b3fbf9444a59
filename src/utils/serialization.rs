// Storage codec: every persisted block and transaction goes through these two helpers
use crate::error::{BlockchainError, Result};

pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
    struct Record {
        height: u64,
        hash: Vec<u8>,
        units: Vec<u64>,
    }

    #[test]
    fn test_record_survives_codec() {
        let original = Record {
            height: 7,
            hash: vec![0xAB; 32],
            units: vec![10, 11, 12],
        };

        let bytes = serialize(&original).expect("Serialization should work");
        let decoded: Record = deserialize(&bytes).expect("Deserialization should work");

        assert_eq!(original, decoded);
    }

    #[test]
    fn test_deserialize_truncated_data() {
        let bytes = serialize(&vec![1u64, 2, 3]).unwrap();
        let result: Result<Record> = deserialize(&bytes[..1]);
        assert!(result.is_err());
    }
}
