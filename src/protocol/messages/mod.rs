//! TTC message codecs.
//!
//! Each request message implements the `Message` trait for single-allocation
//! serialization; responses are parsed by `protocol::response`.

pub mod auth;
pub mod connect;
pub mod data_types;
pub mod execute;
pub mod fetch;
pub mod lob;
pub mod piggyback;
pub mod simple;

pub use auth::{AuthPhaseOneMessage, AuthPhaseTwoMessage, AuthTokenMessage, FastAuthMessage};
pub use connect::{ConnectMessage, ProtocolMessage};
pub use data_types::DataTypesMessage;
pub use execute::ExecuteMessage;
pub use fetch::FetchMessage;
pub use lob::LobOpMessage;
pub use piggyback::{CloseCursorsPiggyback, FlushOutBindsMessage, FreeTempLobsPiggyback};
pub use simple::{SessionReleaseMessage, SimpleFunctionMessage};
