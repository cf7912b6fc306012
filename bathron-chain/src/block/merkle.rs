//! The transaction Merkle tree.

use std::{fmt, io, iter::FromIterator};

use serde::{Deserialize, Serialize};

use crate::serialization::{sha256d, BathronDeserialize, BathronSerialize, SerializationError};
use crate::transaction;

/// The root of the transaction Merkle tree.
///
/// Leaves are transaction hashes; interior nodes are the sha256d of the
/// concatenation of their children, with the last node duplicated on odd
/// levels (the Bitcoin rule).
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl BathronSerialize for Root {
    fn bathron_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl BathronDeserialize for Root {
    fn bathron_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bathron_deserialize(&mut reader)?))
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left);
    preimage[32..].copy_from_slice(right);
    sha256d::digest(&preimage)
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(hashes: I) -> Self {
        let mut layer: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        if layer.is_empty() {
            // An empty block is structurally invalid; the zero root only
            // appears in unreachable states.
            return Root([0u8; 32]);
        }
        while layer.len() > 1 {
            if layer.len() % 2 == 1 {
                let last = *layer.last().expect("layer is non-empty");
                layer.push(last);
            }
            layer = layer
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        Root(layer[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_root_is_its_hash() {
        let hash = transaction::Hash([0xcd; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_level_duplicates_last() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);
        let c = transaction::Hash([3; 32]);

        let root_three: Root = vec![a, b, c].into_iter().collect();
        let root_padded: Root = vec![a, b, c, c].into_iter().collect();
        assert_eq!(root_three, root_padded);
    }

    #[test]
    fn order_matters() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);

        let ab: Root = vec![a, b].into_iter().collect();
        let ba: Root = vec![b, a].into_iter().collect();
        assert_ne!(ab, ba);
    }
}
