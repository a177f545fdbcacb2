pub mod history;
pub mod session;

pub use history::{Message, Role, ToolCallRequest, ToolCallResult, ToolOutcome};
pub use session::Session;
