pub mod accumulator;
pub mod splicer;
pub mod sse;

pub use accumulator::{CompletedToolCall, ToolCallAccumulator};
pub use sse::LineParser;
