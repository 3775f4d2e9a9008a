//! ezmb – a two-sided prefix-routed message bus.
//!
//! Clients attach to either the north or the south endpoint. Messages
//! published on one side are delivered to every connection on the other
//! side holding a subscription prefix of the topic.
//!
//! This crate exports
//!  * `core`    – framing, commands, topic router, outbound queues
//!  * `broker`  – the bridge, connection sessions and listeners
//!  * `client`  – a small async client
//!  * `config`  – TOML + environment configuration
//!
//! Applications can embed the bus (`start_bus`) or build their own binaries
//! on top of the library.

pub mod broker;
pub mod client;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;

pub use crate::broker::engine::serve as start_bus;
pub use crate::broker::{Bridge, BusServer};
pub use crate::client::BusClient;
pub use crate::config::{load_config, Config, Endpoint};
pub use crate::core::error::BusError;
pub use crate::core::side::{Side, Topology};
