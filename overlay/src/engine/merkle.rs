use crate::engine::network::NetworkHandler;
use crate::errors::OverlayError;
use sha2::{Digest, Sha256};
use std::io::Write;
use toroid_types::node::NodeId;

pub(crate) fn sha256_hex(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}

/// Binary hash tree node; internal nodes own their children outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleNode {
    Leaf {
        hash: String,
        index: usize,
    },
    Internal {
        hash: String,
        left: Box<MerkleNode>,
        right: Box<MerkleNode>,
    },
}

impl MerkleNode {
    pub fn hash(&self) -> &str {
        match self {
            MerkleNode::Leaf { hash, .. } => hash,
            MerkleNode::Internal { hash, .. } => hash,
        }
    }

    /// Replaces the hash of leaf `index` and refreshes internal digests
    /// along the way back up. Returns whether the leaf lives in this
    /// subtree; untouched subtrees keep their digests.
    fn update(&mut self, index: usize, new_hash: &str) -> bool {
        match self {
            MerkleNode::Leaf { index: own, hash } => {
                if *own == index {
                    *hash = new_hash.to_string();
                    true
                } else {
                    false
                }
            }
            MerkleNode::Internal { hash, left, right } => {
                let hit = left.update(index, new_hash) || right.update(index, new_hash);
                if hit {
                    *hash = sha256_hex(format!("{}{}", left.hash(), right.hash()).as_bytes());
                }
                hit
            }
        }
    }
}

/// Merkle journal over the per-node content hashes. Leaves hash the
/// stored content strings; the root is the network-wide digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    root: MerkleNode,
    leaf_hashes: Vec<String>,
}

impl MerkleTree {
    /// Builds over the given leaf contents. Returns `None` for an empty
    /// sequence; the node table is never empty in a running overlay.
    pub fn build(contents: &[String]) -> Option<Self> {
        if contents.is_empty() {
            return None;
        }
        let leaf_hashes: Vec<String> = contents
            .iter()
            .map(|content| sha256_hex(content.as_bytes()))
            .collect();
        let root = Self::build_node(&leaf_hashes, 0);
        Some(Self { root, leaf_hashes })
    }

    /// Recursive build: a singleton is the leaf itself, otherwise split
    /// at `mid = count / 2`. Odd counts split unevenly, never duplicate.
    fn build_node(hashes: &[String], offset: usize) -> MerkleNode {
        if hashes.len() == 1 {
            return MerkleNode::Leaf {
                hash: hashes[0].clone(),
                index: offset,
            };
        }
        let mid = hashes.len() / 2;
        let left = Self::build_node(&hashes[..mid], offset);
        let right = Self::build_node(&hashes[mid..], offset + mid);
        let hash = sha256_hex(format!("{}{}", left.hash(), right.hash()).as_bytes());
        MerkleNode::Internal {
            hash,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn root_hash(&self) -> &str {
        self.root.hash()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_hashes.len()
    }

    pub fn leaf_hash(&self, index: usize) -> Option<&str> {
        self.leaf_hashes.get(index).map(String::as_str)
    }

    /// Incremental refresh after one leaf's content changed: recomputes
    /// that leaf and the internal digests on its root path. Postcondition
    /// is rebuild equivalence, pinned by tests.
    pub fn update_leaf(&mut self, index: usize, content: &str) -> bool {
        if index >= self.leaf_hashes.len() {
            return false;
        }
        let new_hash = sha256_hex(content.as_bytes());
        self.leaf_hashes[index] = new_hash.clone();
        self.root.update(index, &new_hash)
    }

    /// Line-oriented journal export: the global root, then one line per
    /// leaf in id order.
    pub fn export_journal<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "MERKLE_ROOT: {}", self.root_hash())?;
        for (index, hash) in self.leaf_hashes.iter().enumerate() {
            writeln!(writer, "Node[{index}]: {hash}")?;
        }
        Ok(())
    }
}

impl NetworkHandler {
    /// Builds the journal tree over the current per-node content hashes.
    #[tracing::instrument(skip(self))]
    pub fn build_merkle_tree(&self) -> MerkleTree {
        let contents: Vec<String> =
            self.with_nodes(|nodes| nodes.iter().map(|node| node.hash.clone()).collect());
        // the handler constructor rejects empty overlays
        MerkleTree::build(&contents).expect("node table is never empty")
    }

    /// Recomputes the leaf-level digest of a node's stored content hash
    /// and compares it bytewise with `expected`.
    pub fn verify_node_integrity(&self, id: NodeId, expected: &str) -> Result<bool, OverlayError> {
        self.with_node(id, |node| sha256_hex(node.hash.as_bytes()) == *expected)
    }

    /// Refreshes one node's leaf in an existing tree from the node's
    /// current content hash.
    pub fn refresh_merkle_leaf(&self, tree: &mut MerkleTree, id: NodeId) -> Result<(), OverlayError> {
        let content = self.with_node(id, |node| node.hash.clone())?;
        if !tree.update_leaf(id.0, &content) {
            return Err(OverlayError::InvalidNode(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toroid_types::DIM;
    use toroid_types::tag::ParityTag;

    fn contents(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_single_leaf_tree_root_is_the_leaf() {
        let tree = MerkleTree::build(&contents(&["a"])).unwrap();
        assert_eq!(tree.root_hash(), sha256_hex(b"a"));
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_four_leaf_root_composes_pairwise() {
        let tree = MerkleTree::build(&contents(&["a", "b", "c", "d"])).unwrap();
        let ab = sha256_hex(format!("{}{}", sha256_hex(b"a"), sha256_hex(b"b")).as_bytes());
        let cd = sha256_hex(format!("{}{}", sha256_hex(b"c"), sha256_hex(b"d")).as_bytes());
        let expected_root = sha256_hex(format!("{ab}{cd}").as_bytes());
        assert_eq!(tree.root_hash(), expected_root);
    }

    #[test]
    fn test_odd_leaf_count_splits_without_duplication() {
        let tree = MerkleTree::build(&contents(&["a", "b", "c"])).unwrap();
        // mid = 1: left subtree is the lone "a" leaf
        let bc = sha256_hex(format!("{}{}", sha256_hex(b"b"), sha256_hex(b"c")).as_bytes());
        let expected_root = sha256_hex(format!("{}{bc}", sha256_hex(b"a")).as_bytes());
        assert_eq!(tree.root_hash(), expected_root);
    }

    #[test]
    fn test_empty_contents_build_nothing() {
        assert_eq!(MerkleTree::build(&[]), None);
    }

    #[test]
    fn test_incremental_update_equals_full_rebuild() {
        let mut values = contents(&["a", "b", "c", "d", "e"]);
        let mut tree = MerkleTree::build(&values).unwrap();
        values[3] = "dd".to_string();
        assert!(tree.update_leaf(3, "dd"));
        let rebuilt = MerkleTree::build(&values).unwrap();
        assert_eq!(tree.root_hash(), rebuilt.root_hash());
        assert_eq!(tree.leaf_hash(3), rebuilt.leaf_hash(3));
    }

    #[test]
    fn test_update_of_unknown_leaf_is_refused() {
        let mut tree = MerkleTree::build(&contents(&["a", "b"])).unwrap();
        assert!(!tree.update_leaf(5, "x"));
    }

    #[test]
    fn test_journal_export_format() {
        let tree = MerkleTree::build(&contents(&["a", "b"])).unwrap();
        let mut out = Vec::new();
        tree.export_journal(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!(
            "MERKLE_ROOT: {}\nNode[0]: {}\nNode[1]: {}\n",
            tree.root_hash(),
            sha256_hex(b"a"),
            sha256_hex(b"b"),
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_network_tree_tracks_node_mutation() {
        let network = NetworkHandler::new(4, DIM, 42).unwrap();
        let mut tree = network.build_merkle_tree();
        let before = tree.root_hash().to_string();
        network
            .assign_parity_tag(NodeId(2), &ParityTag::new("tag-a").unwrap())
            .unwrap();
        network.refresh_merkle_leaf(&mut tree, NodeId(2)).unwrap();
        assert_ne!(tree.root_hash(), before);
        assert_eq!(tree.root_hash(), network.build_merkle_tree().root_hash());
    }

    #[test]
    fn test_verify_node_integrity_round_trip() {
        let network = NetworkHandler::new(2, DIM, 42).unwrap();
        let tree = network.build_merkle_tree();
        let expected = tree.leaf_hash(1).unwrap().to_string();
        assert!(network.verify_node_integrity(NodeId(1), &expected).unwrap());
        assert!(!network.verify_node_integrity(NodeId(1), &sha256_hex(b"bogus")).unwrap());
    }
}
