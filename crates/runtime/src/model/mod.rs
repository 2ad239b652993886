//! Provider-neutral conversation types.

pub mod arguments;
pub mod errors;
pub mod types;

pub use arguments::decode_arguments;
pub use errors::ModelError;
pub use types::{Message, Role, ToolCall, ToolResult, ToolSpec, Turn};
