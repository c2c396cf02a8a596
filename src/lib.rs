//! # IMC Runtime
//!
//! A Rust runtime for the Inter-Module Communication (IMC) binary
//! protocol used between autonomous marine vehicles and their consoles:
//! schema-driven message catalog, wire codec, byte transports, a
//! resynchronizing message bus, peer discovery, and a subscription
//! dispatcher.

pub mod bus;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod hostaddr;
pub mod logging;
pub mod message;
pub mod peers;
pub mod schema;
pub mod transport;

pub use bus::{MessageBus, OutboundHandle};
pub use dispatcher::{Delivered, Dispatcher, Selector, StopHandle};
pub use error::{DispatchError, FrameError, ImcError, Result, SchemaError, TransportError, ValidationError};
pub use message::{Header, Message, Value};
pub use peers::PeerRegistry;
pub use schema::{Catalog, MessageDescriptor, SelectionMode};
pub use transport::ByteTransport;

/// The current version of the runtime crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
