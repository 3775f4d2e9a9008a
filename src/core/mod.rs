pub mod command;
pub mod connection;
pub mod error;
pub mod frame;
pub mod message;
pub mod observer;
pub mod queue;
pub mod side;
pub mod topics;
