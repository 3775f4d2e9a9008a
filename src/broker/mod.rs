//! # Broker Module
//!
//! - `engine`: the bridge, connection sessions and accept loops.
//! - `transport`: TCP and Unix-socket listeners/streams behind the
//!   `tcp://` and `ipc://` endpoints.

pub mod engine;
pub mod transport;

pub use self::engine::{serve, Bridge, BusServer};
