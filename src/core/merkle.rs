use crate::utils::sha256_digest;

/// Merkle root over transaction ids, pairing with double SHA-256 and
/// duplicating the last hash of an odd level. An empty list (a block whose
/// every transaction was filtered out) commits to `SHA256("")`.
pub fn merkle_root(ids: &[Vec<u8>]) -> Vec<u8> {
    match ids.len() {
        0 => sha256_digest(&[]),
        1 => hash_pair(&ids[0], &ids[0]),
        _ => {
            let mut level = ids.to_vec();
            while level.len() > 1 {
                level = level
                    .chunks(2)
                    .map(|pair| match pair {
                        [left, right] => hash_pair(left, right),
                        [single] => hash_pair(single, single),
                        _ => Vec::new(),
                    })
                    .collect();
            }
            level.pop().unwrap_or_default()
        }
    }
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&sha256_digest(&combined))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_depends_on_order() {
        let a = vec![1u8; 32];
        let b = vec![2u8; 32];
        let c = vec![3u8; 32];
        let root = merkle_root(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(root.len(), 32);
        assert_ne!(root, merkle_root(&[b, a, c]));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let a = vec![1u8; 32];
        let b = vec![2u8; 32];
        let c = vec![3u8; 32];
        assert_eq!(
            merkle_root(&[a.clone(), b.clone(), c.clone()]),
            merkle_root(&[a, b, c.clone(), c])
        );
    }

    #[test]
    fn test_empty_list_has_fixed_root() {
        assert_eq!(merkle_root(&[]), sha256_digest(&[]));
    }
}
