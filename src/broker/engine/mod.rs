//! Bus engine: the bridge shared by all connections, per-connection
//! sessions, and the accept loops feeding them.

pub mod bridge;
pub mod server;
pub mod session;

pub use bridge::{Bridge, ConnectionHandle, PublishReport};
pub use server::{serve, spawn_session, BusServer};
pub use session::run_session;
