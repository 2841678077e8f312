//! Server access: HTTP client, poll loop and command dispatch.

/// Typed wrapper around the game's HTTP API.
pub mod client;
/// Fixed-rate polling and background command submission.
pub mod poll;

pub use client::{Ack, AdminAction, ClientError, Command, GameClient, OrderType};
pub use poll::{ClientEvent, Dispatcher, Poller};
