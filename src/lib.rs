pub mod bridge;
pub mod catalog;
pub mod config;
pub(crate) mod error;
pub mod mcp;
pub mod model;

pub use bridge::{Message, Session};
pub use error::{BridgeError, Result, ToolFailure};
