// src/tokenizer/trie.rs

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
struct TrieNode {
    is_leaf: bool,
    children: FxHashMap<u8, usize>,
}

/// Byte-level prefix tree stored as an arena of nodes, children addressed by index.
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<TrieNode>,
}

impl Default for Trie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl Trie {
    pub fn push(&mut self, element: &[u8]) {
        let mut node = 0;
        for &byte in element {
            node = match self.nodes[node].children.get(&byte) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(byte, child);
                    child
                }
            };
        }
        self.nodes[node].is_leaf = true;
    }

    /// Byte lengths of every stored element that is a prefix of `bytes`, shortest first.
    pub fn common_prefix_search<I>(&self, bytes: I) -> Vec<usize>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut lengths = Vec::new();
        let mut node = 0;
        for (i, byte) in bytes.into_iter().enumerate() {
            match self.nodes[node].children.get(&byte) {
                Some(&child) => node = child,
                None => break,
            }
            if self.nodes[node].is_leaf {
                lengths.push(i + 1);
            }
        }
        lengths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_all_prefixes() {
        let mut trie = Trie::default();
        for word in ["a", "ab", "abc", "b", "abd"] {
            trie.push(word.as_bytes());
        }
        assert_eq!(trie.common_prefix_search("abcd".bytes()), vec![1, 2, 3]);
        assert_eq!(trie.common_prefix_search("bz".bytes()), vec![1]);
        assert!(trie.common_prefix_search("zz".bytes()).is_empty());
    }
}
