use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::core::connection::ConnectionId;
use crate::core::side::Side;
use crate::core::topics::trie::PrefixTrie;

/// Counters for one side of the routing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideStats {
    pub prefixes: usize,
    pub subscriptions: usize,
    pub trie_nodes: usize,
}

/// Point-in-time summary of the routing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub north: SideStats,
    pub south: SideStats,
    pub connections: usize,
}

#[derive(Debug)]
struct Owned {
    side: Side,
    prefixes: HashSet<Bytes>,
}

#[derive(Debug, Default)]
struct RouterState {
    /// Indexed by [`Side::index`].
    tries: [PrefixTrie; 2],
    /// Reverse index used to drop everything a connection owns at teardown.
    owners: HashMap<ConnectionId, Owned>,
}

/// [`TopicRouter`] maps subscription prefixes to connection ids, one prefix
/// tree per side.
///
/// All access goes through a single `RwLock`. Mutations are exclusive;
/// `match_targets` takes a shared lock for the duration of one trie walk
/// and never while any I/O is in progress.
#[derive(Debug, Default)]
pub struct TopicRouter {
    state: RwLock<RouterState>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest of `conn` (living on `side`) in `prefix`.
    ///
    /// Idempotent: returns `false` if the pair already existed. A connection
    /// keeps the side it first subscribed with; a request naming the other
    /// side is ignored.
    pub fn subscribe(&self, conn: ConnectionId, side: Side, prefix: Bytes) -> bool {
        let mut state = self.state.write();
        let RouterState { tries, owners } = &mut *state;

        let owned = owners.entry(conn).or_insert_with(|| Owned {
            side,
            prefixes: HashSet::new(),
        });
        if owned.side != side {
            warn!(
                target: "ezmb::router",
                %conn,
                bound = %owned.side,
                requested = %side,
                "ignoring subscribe for the other side"
            );
            return false;
        }
        if !owned.prefixes.insert(prefix.clone()) {
            return false;
        }

        tries[side.index()].insert(&prefix, conn);
        debug!(
            target: "ezmb::router",
            %conn,
            %side,
            prefix = %String::from_utf8_lossy(&prefix),
            "subscribed"
        );
        true
    }

    /// Removes the (`conn`, `prefix`) pair. Unknown pairs are a no-op
    /// returning `false`.
    pub fn unsubscribe(&self, conn: ConnectionId, prefix: &[u8]) -> bool {
        let mut state = self.state.write();
        let RouterState { tries, owners } = &mut *state;

        let Some(owned) = owners.get_mut(&conn) else {
            return false;
        };
        if !owned.prefixes.remove(prefix) {
            return false;
        }
        let side = owned.side;
        if owned.prefixes.is_empty() {
            owners.remove(&conn);
        }

        tries[side.index()].remove(prefix, conn);
        debug!(
            target: "ezmb::router",
            %conn,
            %side,
            prefix = %String::from_utf8_lossy(prefix),
            "unsubscribed"
        );
        true
    }

    /// Drops every subscription owned by `conn`. Safe to call for a
    /// connection with no subscriptions. Returns how many were removed.
    pub fn remove_connection(&self, conn: ConnectionId) -> usize {
        let mut state = self.state.write();
        let RouterState { tries, owners } = &mut *state;

        let Some(owned) = owners.remove(&conn) else {
            return 0;
        };
        let trie = &mut tries[owned.side.index()];
        for prefix in &owned.prefixes {
            trie.remove(prefix, conn);
        }
        owned.prefixes.len()
    }

    /// Connections on the side opposite to `origin` holding a prefix of
    /// `topic`.
    pub fn match_targets(&self, topic: &[u8], origin: Side) -> HashSet<ConnectionId> {
        let mut out = HashSet::new();
        let state = self.state.read();
        state.tries[origin.opposite().index()].collect_matches(topic, &mut out);
        out
    }

    /// Prefixes currently held by `conn`, sorted.
    pub fn subscriptions_of(&self, conn: ConnectionId) -> Vec<Bytes> {
        let state = self.state.read();
        let mut prefixes: Vec<Bytes> = state
            .owners
            .get(&conn)
            .map(|owned| owned.prefixes.iter().cloned().collect())
            .unwrap_or_default();
        prefixes.sort();
        prefixes
    }

    pub fn stats(&self) -> RouterStats {
        let state = self.state.read();
        let side_stats = |side: Side| {
            let trie = &state.tries[side.index()];
            SideStats {
                prefixes: trie.prefix_count(),
                subscriptions: trie.subscription_count(),
                trie_nodes: trie.node_count(),
            }
        };
        RouterStats {
            north: side_stats(Side::North),
            south: side_stats(Side::South),
            connections: state.owners.len(),
        }
    }
}
