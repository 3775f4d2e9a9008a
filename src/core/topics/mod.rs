//! Prefix-based subscription routing.

pub mod router;
pub mod trie;

pub use router::{RouterStats, SideStats, TopicRouter};
pub use trie::PrefixTrie;
