use crate::error::BlockchainError;
use bincode::de::Decoder;
use bincode::error::DecodeError;
use bincode::Decode;
use serde::{Deserialize, Serialize};

/// An ordered set of serial indices. Every unit is minted exactly once by a
/// coinbase and afterwards only changes hands, so the set an output carries
/// is both its value (`len`) and the identity of the coins it holds.
///
/// Indices are strictly increasing. Both decoders refuse anything else, so a
/// set read off the wire or the store upholds the same order as one built here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct Units(Vec<u64>);

impl TryFrom<Vec<u64>> for Units {
    type Error = BlockchainError;

    fn try_from(indices: Vec<u64>) -> Result<Units, BlockchainError> {
        if indices.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(BlockchainError::Serialization(
                "Unit indices must be strictly increasing".to_string(),
            ));
        }
        Ok(Units(indices))
    }
}

impl From<Units> for Vec<u64> {
    fn from(units: Units) -> Vec<u64> {
        units.0
    }
}

impl<Context> Decode<Context> for Units {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Units, DecodeError> {
        let indices = Vec::<u64>::decode(decoder)?;
        Units::try_from(indices).map_err(|e| DecodeError::OtherString(e.to_string()))
    }
}

bincode::impl_borrow_decode!(Units);

impl Units {
    /// `count` contiguous indices starting at `start`.
    pub fn range(start: u64, count: u64) -> Units {
        Units((start..start + count).collect())
    }

    pub fn from_indices(indices: impl IntoIterator<Item = u64>) -> Units {
        let mut units: Vec<u64> = indices.into_iter().collect();
        units.sort_unstable();
        units.dedup();
        Units(units)
    }

    pub fn len(&self) -> u64 {
        self.0.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max_index(&self) -> Option<u64> {
        self.0.last().copied()
    }

    pub fn min_index(&self) -> Option<u64> {
        self.0.first().copied()
    }

    pub fn contains(&self, index: u64) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    /// True when the set is exactly `start, start + 1, ..`.
    pub fn is_contiguous_from(&self, start: u64) -> bool {
        self.0
            .iter()
            .enumerate()
            .all(|(offset, index)| *index == start + offset as u64)
    }

    /// First `n` units and the remainder, in index order.
    pub fn split_at(&self, n: u64) -> (Units, Units) {
        let n = (n as usize).min(self.0.len());
        let (head, tail) = self.0.split_at(n);
        (Units(head.to_vec()), Units(tail.to_vec()))
    }

    /// Merges `other` into the set.
    pub fn extend(&mut self, other: &Units) {
        for index in other.iter() {
            if let Err(pos) = self.0.binary_search(&index) {
                self.0.insert(pos, index);
            }
        }
    }
}
