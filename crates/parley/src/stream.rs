//! One streaming generation: accumulating chunks, tool-call deltas and citations while
//! reporting progress and honoring cancellation.

pub mod accumulator;
pub mod embedded;
pub mod session;

pub use accumulator::{flatten_content, StreamAccumulator};
pub use embedded::extract_tool_calls;
pub use session::{StreamObserver, StreamOutcome, StreamingSession};
