//! These models represent the objects the core passes around.
//!
//! There are several related formats in play:
//! - conversation turns, persisted by the conversation store and shown to users
//! - adapted turns, reshaped for a specific provider (see `crate::adapter`)
//! - stream chunks and tool-call deltas, produced by a model handle
//! - tool calls and outcomes, exchanged with the tool executor
//!
//! Persisted data always enters through these structs; provider-specific shapes are built
//! from them and never stored.
pub mod content;
pub mod role;
pub mod tool;
pub mod turn;
