#![warn(clippy::all, missing_docs)]

//! Core logic for the Foundry terminal client.
//!
//! This crate hosts the snapshot model, the payment validation rules,
//! the reconciliation view model, the HTTP client with its poll loop,
//! configuration and identity persistence used by the terminal UI.

pub mod config;
pub mod identity;
pub mod models;
pub mod net;
pub mod rules;
pub mod state;
pub mod view;

pub use config::AppConfig;
pub use identity::{Identity, IdentityStore};
pub use models::{AdminSnapshot, Facility, FacilityKind, ItemMeta, Phase, PlayerState, Snapshot};
pub use net::{
    AdminAction, ClientError, ClientEvent, Command, Dispatcher, GameClient, OrderType, Poller,
};
pub use rules::{Action, PendingSelection, Rejection, SpecialKind, Validator};
pub use state::{AdminState, ClientState, TradeMode};
