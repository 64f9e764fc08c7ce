//! Streaming encoder seam: ordered chunk emission over a continuous frame feed.

/// Encoder backed by the system `ffmpeg` binary.
pub mod ffmpeg;

use std::path::PathBuf;
use std::time::Duration;

use crate::foundation::{
    core::{Canvas, Fps, FrameIndex},
    error::{FramecastError, FramecastResult},
};

/// Codec preference entries, ordered most- to least-preferred by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Codec {
    /// High-efficiency preferred option (WebM container).
    Vp9,
    /// Widely-supported fallback (fragmented MP4 container).
    H264,
    /// Generic container with no codec constraint (Matroska, encoder's choice).
    Unconstrained,
}

impl Codec {
    /// Container/codec tag pair for artifacts encoded with this option.
    pub fn descriptor(self) -> CodecDescriptor {
        match self {
            Self::Vp9 => CodecDescriptor {
                container: "webm",
                codec: Some("vp9"),
            },
            Self::H264 => CodecDescriptor {
                container: "mp4",
                codec: Some("avc1"),
            },
            Self::Unconstrained => CodecDescriptor {
                container: "x-matroska",
                codec: None,
            },
        }
    }
}

/// Negotiated container/codec pair an artifact is tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodecDescriptor {
    /// Container subtype.
    pub container: &'static str,
    /// Codec tag, absent for unconstrained output.
    pub codec: Option<&'static str>,
}

impl CodecDescriptor {
    /// MIME-style descriptor string, e.g. `video/webm;codecs=vp9`.
    pub fn mime_type(&self) -> String {
        match self.codec {
            Some(codec) => format!("video/{};codecs={codec}", self.container),
            None => format!("video/{}", self.container),
        }
    }
}

/// Ordered opaque byte buffer emitted by an encoder.
///
/// Concatenating chunks in emission order reproduces the container stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Chunk bytes.
    pub data: Vec<u8>,
}

/// Decoded audio hand-off: raw interleaved `f32le` PCM on disk.
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Path to interleaved `f32le` PCM data.
    pub path: PathBuf,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

/// Configuration handed to a [`StreamEncoder`] at the start of a run.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    /// Output dimensions.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Target video bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Periodic flush interval bounding the encoder's internal buffering.
    pub flush_interval: Duration,
    /// Ordered codec preference; the first supported entry wins.
    pub codec_preference: Vec<Codec>,
    /// Background used when flattening premultiplied frames to opaque RGBA.
    pub bg_rgba: [u8; 4],
    /// Optional decoded audio track to mux in.
    pub audio: Option<AudioInputConfig>,
}

impl EncoderConfig {
    /// Validate encoder setup inputs.
    pub fn validate(&self) -> FramecastResult<()> {
        self.canvas.validate()?;
        if self.bitrate_bps == 0 {
            return Err(FramecastError::validation("bitrate_bps must be non-zero"));
        }
        if self.codec_preference.is_empty() {
            return Err(FramecastError::validation(
                "codec preference list must be non-empty",
            ));
        }
        if let Some(audio) = self.audio.as_ref() {
            if audio.sample_rate == 0 {
                return Err(FramecastError::validation(
                    "audio sample_rate must be non-zero when audio is enabled",
                ));
            }
            if audio.channels == 0 {
                return Err(FramecastError::validation(
                    "audio channels must be non-zero when audio is enabled",
                ));
            }
        }
        Ok(())
    }
}

/// Streaming encoder contract.
///
/// Ordering contract: `push_frame` is called in strictly increasing
/// [`FrameIndex`] order, and emitted chunks concatenate in emission order.
pub trait StreamEncoder {
    /// Negotiate a codec from the preference list and start the encoder.
    ///
    /// Failure here — including exhausting the full codec fallback — is a
    /// fatal setup error; no partial artifact exists yet.
    fn begin(&mut self, cfg: &EncoderConfig) -> FramecastResult<()>;

    /// Push one premultiplied RGBA8 frame in strictly increasing order.
    fn push_frame(&mut self, idx: FrameIndex, frame_premul_rgba: &[u8]) -> FramecastResult<()>;

    /// Stop the encoder and return every emitted chunk in emission order.
    fn finish(&mut self) -> FramecastResult<Vec<EncodedChunk>>;

    /// Best-effort teardown after a mid-run failure or cancellation.
    ///
    /// Must not panic and must swallow secondary errors; the original run
    /// error is what callers see.
    fn abort(&mut self);

    /// Negotiated descriptor, available after a successful `begin`.
    fn descriptor(&self) -> Option<CodecDescriptor>;
}

/// In-memory encoder for tests and debugging.
///
/// Emits one small synthetic chunk per frame (frame index + byte sum), so
/// ordering and teardown behavior are observable without a real encoder.
#[derive(Debug)]
pub struct InMemoryEncoder {
    supported: Vec<Codec>,
    fail_on_frame: Option<u64>,
    cfg: Option<EncoderConfig>,
    running: bool,
    descriptor: Option<CodecDescriptor>,
    chunks: Vec<EncodedChunk>,
    last_idx: Option<FrameIndex>,
    aborted: bool,
}

impl Default for InMemoryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEncoder {
    /// Encoder that supports every codec.
    pub fn new() -> Self {
        Self {
            supported: vec![Codec::Vp9, Codec::H264, Codec::Unconstrained],
            fail_on_frame: None,
            cfg: None,
            running: false,
            descriptor: None,
            chunks: Vec::new(),
            last_idx: None,
            aborted: false,
        }
    }

    /// Restrict the supported codec set (for fallback-order tests).
    pub fn with_supported(mut self, supported: Vec<Codec>) -> Self {
        self.supported = supported;
        self
    }

    /// Fail `push_frame` at the given global frame (for teardown tests).
    pub fn with_failure_at(mut self, frame: u64) -> Self {
        self.fail_on_frame = Some(frame);
        self
    }

    /// Whether `abort` has been called.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Configuration captured by the most recent `begin`.
    pub fn config(&self) -> Option<&EncoderConfig> {
        self.cfg.as_ref()
    }

    /// Chunks emitted so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl StreamEncoder for InMemoryEncoder {
    fn begin(&mut self, cfg: &EncoderConfig) -> FramecastResult<()> {
        cfg.validate()?;

        let negotiated = cfg
            .codec_preference
            .iter()
            .copied()
            .find(|c| self.supported.contains(c))
            .ok_or_else(|| {
                FramecastError::encode(
                    "encoder failed to start: no supported codec after full fallback",
                )
            })?;

        self.cfg = Some(cfg.clone());
        self.running = true;
        self.descriptor = Some(negotiated.descriptor());
        self.chunks.clear();
        self.last_idx = None;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame_premul_rgba: &[u8]) -> FramecastResult<()> {
        if !self.running {
            return Err(FramecastError::encode("in-memory encoder not started"));
        }
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FramecastError::encode("in-memory encoder not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(FramecastError::encode(
                "encoder received out-of-order frame index",
            ));
        }
        if frame_premul_rgba.len() != cfg.canvas.frame_byte_len() {
            return Err(FramecastError::validation(
                "frame byte length mismatch with canvas dimensions",
            ));
        }
        if self.fail_on_frame == Some(idx.0) {
            return Err(FramecastError::encode(format!(
                "simulated encoder failure at frame {}",
                idx.0
            )));
        }
        self.last_idx = Some(idx);

        let sum: u64 = frame_premul_rgba
            .iter()
            .fold(0u64, |acc, &b| acc.wrapping_add(u64::from(b)));
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&idx.0.to_be_bytes());
        data.extend_from_slice(&sum.to_be_bytes());
        self.chunks.push(EncodedChunk { data });
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<Vec<EncodedChunk>> {
        if !self.running {
            return Err(FramecastError::encode("in-memory encoder not started"));
        }
        self.running = false;
        Ok(std::mem::take(&mut self.chunks))
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.running = false;
        self.chunks.clear();
    }

    fn descriptor(&self) -> Option<CodecDescriptor> {
        self.descriptor
    }
}
