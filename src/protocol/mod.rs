//! TTC/TNS protocol implementation.

pub mod auth;
pub mod buffer;
pub mod capabilities;
pub mod connect;
pub mod constants;
pub mod crypto;
pub mod decode;
pub mod engine;
pub mod message;
pub mod messages;
pub mod packet;
pub mod response;
pub mod transport;
pub mod types;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use capabilities::{Capabilities, ConnectionCookie};
pub use engine::{BreakSignal, Engine, EngineState};
pub use message::{DataMessage, Message, WriteExt};
pub use packet::Packet;
pub use transport::{TlsParams, Transport};
