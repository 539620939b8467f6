pub mod base;
pub mod factory;
#[cfg(test)]
pub mod mock;
pub mod profile;

pub use base::{ChunkStream, ModelHandle, ModelResponse, StreamChunk, ToolCallDelta};
pub use factory::resolve_profile;
pub use profile::{ImageContentShape, ProviderKind, ProviderProfile};
