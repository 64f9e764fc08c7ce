//! Framecast turns a timed sequence of textual script sections into a finished
//! video artifact in one long-running operation.
//!
//! The pipeline is frame-paced and streaming:
//!
//! - Build a per-section [`SectionPaintCache`] once per run
//! - Paint every frame into a single reusable surface
//! - Feed frames continuously into a [`StreamEncoder`] that emits ordered chunks
//! - Optionally splice in a decoded narration track
//! - Report throttled progress and honor cooperative cancellation
//!
//! The top-level entry point is [`VideoGenerator::generate`]; the streaming
//! core underneath is [`StreamingRenderer::render_from_sections`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod audio;
/// Streaming encoder seam and implementations.
pub mod encode;
/// Per-section paint caches and the frame painter.
pub mod paint;
/// Generation pipeline orchestrator.
pub mod pipeline;
/// Streaming renderer.
pub mod render;
/// Script section boundary model.
pub mod script;
/// Frame sequencing, pacing and cancellation.
pub mod sequence;
/// Speech-synthesis collaborator seam.
pub mod synthesis;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, Rgba8Premul};
pub use crate::foundation::error::{FramecastError, FramecastResult};

pub use crate::encode::ffmpeg::FfmpegStreamEncoder;
pub use crate::encode::{
    Codec, CodecDescriptor, EncodedChunk, EncoderConfig, InMemoryEncoder, StreamEncoder,
};
pub use crate::paint::TextMeasure;
pub use crate::paint::cache::{PaintOptions, SectionPaintCache};
pub use crate::paint::frame::SectionPainter;
pub use crate::pipeline::orchestrator::{
    GenerationProgress, GenerationStep, VideoGenerator, estimate_generation_time,
};
pub use crate::render::streamer::{RenderConfig, StreamingRenderer, VideoArtifact};
pub use crate::script::model::{Section, SectionKind};
pub use crate::sequence::cancel::CancelToken;
pub use crate::sequence::sequencer::{FrameProgress, FrameSequencer, FrameTick, SequenceStats};
pub use crate::synthesis::{NullSynthesizer, SpeechOptions, SpeechSynthesizer};
