pub mod transport;
pub mod types;

pub use transport::{McpTransport, ToolTransport};
pub use types::{ToolContent, ToolDefinition};
