use std::collections::{BTreeMap, HashSet};

use crate::core::connection::ConnectionId;

type NodeIdx = usize;

const ROOT: NodeIdx = 0;

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<u8, NodeIdx>,
    /// Link back to the parent and the edge byte, `None` for the root.
    parent: Option<(NodeIdx, u8)>,
    /// Connections subscribed with exactly the prefix spelled by this node.
    subscribers: HashSet<ConnectionId>,
}

impl Node {
    fn is_vacant(&self) -> bool {
        self.children.is_empty() && self.subscribers.is_empty()
    }
}

/// Byte-wise prefix tree mapping subscription prefixes to connections.
///
/// Nodes live in an arena so that insertion, removal and matching are all
/// iterative regardless of prefix length. Nodes left without subscribers or
/// children are released immediately.
#[derive(Debug)]
pub struct PrefixTrie {
    nodes: Vec<Node>,
    free: Vec<NodeIdx>,
    prefixes: usize,
    subscriptions: usize,
}

impl Default for PrefixTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            free: Vec::new(),
            prefixes: 0,
            subscriptions: 0,
        }
    }

    /// Registers `conn` under `prefix`. Returns `false` if it was already there.
    pub fn insert(&mut self, prefix: &[u8], conn: ConnectionId) -> bool {
        let mut idx = ROOT;
        for &byte in prefix {
            let next = self.nodes[idx].children.get(&byte).copied();
            idx = match next {
                Some(child) => child,
                None => {
                    let child = self.alloc(idx, byte);
                    self.nodes[idx].children.insert(byte, child);
                    child
                }
            };
        }

        let node = &mut self.nodes[idx];
        let was_empty = node.subscribers.is_empty();
        if !node.subscribers.insert(conn) {
            return false;
        }
        if was_empty {
            self.prefixes += 1;
        }
        self.subscriptions += 1;
        true
    }

    /// Removes `conn` from `prefix`, pruning nodes that become vacant.
    /// Returns `false` if the pair was not registered.
    pub fn remove(&mut self, prefix: &[u8], conn: ConnectionId) -> bool {
        let Some(mut idx) = self.find(prefix) else {
            return false;
        };

        let node = &mut self.nodes[idx];
        if !node.subscribers.remove(&conn) {
            return false;
        }
        self.subscriptions -= 1;
        if node.subscribers.is_empty() {
            self.prefixes -= 1;
        }

        while idx != ROOT && self.nodes[idx].is_vacant() {
            let Some((parent, byte)) = self.nodes[idx].parent else {
                break;
            };
            self.nodes[parent].children.remove(&byte);
            self.release(idx);
            idx = parent;
        }
        true
    }

    /// Adds to `out` every connection whose prefix is a prefix of `topic`.
    pub fn collect_matches(&self, topic: &[u8], out: &mut HashSet<ConnectionId>) {
        let mut idx = ROOT;
        out.extend(self.nodes[idx].subscribers.iter().copied());
        for byte in topic {
            match self.nodes[idx].children.get(byte) {
                Some(&child) => {
                    idx = child;
                    out.extend(self.nodes[idx].subscribers.iter().copied());
                }
                None => break,
            }
        }
    }

    /// Number of distinct prefixes with at least one subscriber.
    pub fn prefix_count(&self) -> usize {
        self.prefixes
    }

    /// Number of (connection, prefix) pairs.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn find(&self, prefix: &[u8]) -> Option<NodeIdx> {
        let mut idx = ROOT;
        for byte in prefix {
            idx = *self.nodes[idx].children.get(byte)?;
        }
        Some(idx)
    }

    fn alloc(&mut self, parent: NodeIdx, byte: u8) -> NodeIdx {
        let node = Node {
            parent: Some((parent, byte)),
            ..Node::default()
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: NodeIdx) {
        self.nodes[idx] = Node::default();
        if idx == self.nodes.len() - 1 {
            self.nodes.pop();
        } else {
            self.free.push(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(trie: &PrefixTrie, topic: &[u8]) -> HashSet<ConnectionId> {
        let mut out = HashSet::new();
        trie.collect_matches(topic, &mut out);
        out
    }

    #[test]
    fn empty_prefix_matches_every_topic() {
        let mut trie = PrefixTrie::new();
        trie.insert(b"", ConnectionId(1));
        assert!(matches(&trie, b"").contains(&ConnectionId(1)));
        assert!(matches(&trie, b"anything").contains(&ConnectionId(1)));
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn only_true_prefixes_match() {
        let mut trie = PrefixTrie::new();
        trie.insert(b"port0", ConnectionId(1));
        trie.insert(b"port0_south_topic", ConnectionId(2));
        trie.insert(b"port1", ConnectionId(3));
        trie.insert(b"port0_south_topic_longer", ConnectionId(4));

        let hit = matches(&trie, b"port0_south_topic");
        assert_eq!(hit, HashSet::from([ConnectionId(1), ConnectionId(2)]));
        assert!(matches(&trie, b"port").is_empty());
    }

    #[test]
    fn removal_prunes_branch_back_to_shared_ancestor() {
        let mut trie = PrefixTrie::new();
        trie.insert(b"ab", ConnectionId(1));
        let after_first = trie.node_count();
        trie.insert(b"abcd", ConnectionId(2));
        assert_eq!(trie.node_count(), after_first + 2);

        assert!(trie.remove(b"abcd", ConnectionId(2)));
        assert_eq!(trie.node_count(), after_first);
        assert!(!trie.remove(b"abcd", ConnectionId(2)));

        assert!(trie.remove(b"ab", ConnectionId(1)));
        assert_eq!(trie.node_count(), 1);
        assert_eq!(trie.prefix_count(), 0);
        assert_eq!(trie.subscription_count(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut trie = PrefixTrie::new();
        trie.insert(b"a", ConnectionId(1));
        trie.insert(b"b", ConnectionId(1));
        trie.remove(b"a", ConnectionId(1));
        trie.insert(b"c", ConnectionId(1));
        assert_eq!(trie.node_count(), 3);
        assert_eq!(matches(&trie, b"c"), HashSet::from([ConnectionId(1)]));
        assert!(matches(&trie, b"a").is_empty());
    }

    #[test]
    fn duplicate_insert_is_not_counted_twice() {
        let mut trie = PrefixTrie::new();
        assert!(trie.insert(b"x", ConnectionId(7)));
        assert!(!trie.insert(b"x", ConnectionId(7)));
        assert_eq!(trie.subscription_count(), 1);
        assert_eq!(trie.prefix_count(), 1);
    }

    #[test]
    fn long_prefixes_do_not_recurse() {
        let mut trie = PrefixTrie::new();
        let prefix = vec![b'z'; 200_000];
        trie.insert(&prefix, ConnectionId(1));
        assert!(matches(&trie, &prefix).contains(&ConnectionId(1)));
        assert!(trie.remove(&prefix, ConnectionId(1)));
        assert_eq!(trie.node_count(), 1);
    }
}
