pub mod current_datetime_tool;
pub mod simple_date_tool;
mod tool;

pub use current_datetime_tool::CurrentDatetimeTool;
pub use simple_date_tool::SimpleDateTool;
pub use tool::{FunctionDescriptor, LlmTool, ToolDescriptor, ToolOutcome};
