//! Streaming renderer: one reusable surface, paced paint → encode loop.

/// The streaming renderer and its configuration/artifact types.
pub mod streamer;
