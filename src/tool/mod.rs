// ABOUTME: Tool module - shared data model for tool execution.
// ABOUTME: Defines the Tool trait for builtins and the uniform ToolResult.

mod result;
mod traits;

pub use result::*;
pub use traits::*;
