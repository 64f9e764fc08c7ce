use std::time::Duration;

use crate::audio::{TempFileGuard, decode_audio_bytes, temp_track_path, write_track_to_f32le_file};
use crate::encode::{AudioInputConfig, Codec, CodecDescriptor, EncoderConfig, StreamEncoder};
use crate::foundation::{
    core::{Canvas, Fps},
    error::{FramecastError, FramecastResult},
};
use crate::paint::cache::{PaintOptions, SectionPaintCache};
use crate::paint::frame::SectionPainter;
use crate::script::model::{Section, ordered_sections, validate_sections};
use crate::sequence::cancel::CancelToken;
use crate::sequence::sequencer::{FrameProgress, FrameSequencer, FrameTick};

/// Streaming render configuration.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Output dimensions; must be even (yuv420p) and at most 65535 per axis.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Target video bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Encoder flush interval bounding internal buffering.
    pub flush_interval: Duration,
    /// Ordered codec preference, most-preferred first.
    pub codec_preference: Vec<Codec>,
    /// Paint styling.
    pub paint: PaintOptions,
    /// Pace the frame loop to wall clock. Required for a live audio track to
    /// stay in sync; turn off for offline transcodes and tests.
    pub realtime_pacing: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas {
                width: 1280,
                height: 720,
            },
            fps: Fps { num: 30, den: 1 },
            bitrate_bps: 2_500_000,
            flush_interval: Duration::from_secs(1),
            codec_preference: vec![Codec::Vp9, Codec::H264, Codec::Unconstrained],
            paint: PaintOptions::default(),
            realtime_pacing: true,
        }
    }
}

/// Finished video artifact: ordered encoder chunks concatenated into one
/// buffer, tagged with the negotiated container/codec.
#[derive(Clone, Debug)]
pub struct VideoArtifact {
    /// Container stream bytes.
    pub data: Vec<u8>,
    /// Negotiated container/codec descriptor.
    pub descriptor: CodecDescriptor,
    /// Output dimensions.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Frames encoded.
    pub frame_count: u64,
    /// Timeline duration in seconds.
    pub duration_secs: f64,
}

impl VideoArtifact {
    /// MIME-style tag, e.g. `video/webm;codecs=vp9`.
    pub fn mime_type(&self) -> String {
        self.descriptor.mime_type()
    }
}

/// Owns the run's mutable resources: exactly one reusable frame surface, the
/// painter and the sequencer.
///
/// Per-frame surface allocation is rejected by construction — the pixmap is
/// allocated once here and repainted in place, so memory stays O(1) in frame
/// count. Instances are independent; concurrent runs need separate instances.
pub struct StreamingRenderer {
    cfg: RenderConfig,
    painter: SectionPainter,
    surface: vello_cpu::Pixmap,
    sequencer: FrameSequencer,
}

impl StreamingRenderer {
    /// Validate the configuration and allocate the frame surface.
    pub fn new(cfg: RenderConfig) -> FramecastResult<Self> {
        cfg.canvas.validate()?;
        let w: u16 = cfg
            .canvas
            .width
            .try_into()
            .map_err(|_| FramecastError::validation("canvas width exceeds u16"))?;
        let h: u16 = cfg
            .canvas
            .height
            .try_into()
            .map_err(|_| FramecastError::validation("canvas height exceeds u16"))?;

        let painter = SectionPainter::new(cfg.canvas, cfg.paint.clone());
        let sequencer = FrameSequencer::new(cfg.fps, cfg.realtime_pacing);
        Ok(Self {
            cfg,
            painter,
            surface: vello_cpu::Pixmap::new(w, h),
            sequencer,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &RenderConfig {
        &self.cfg
    }

    /// Render `sections` through `encoder` into a finished artifact.
    ///
    /// `audio_bytes`, when supplied, is decoded once up front; a decode
    /// failure is logged and the run continues video-only. Encoder startup
    /// failure (after the full codec fallback) aborts with no partial
    /// artifact. On a mid-run error or cancellation the encoder is torn down
    /// best-effort and the original error is returned.
    pub fn render_from_sections(
        &mut self,
        sections: &[Section],
        audio_bytes: Option<&[u8]>,
        encoder: &mut dyn StreamEncoder,
        on_progress: &mut dyn FnMut(FrameProgress),
        mut on_frame: Option<&mut dyn FnMut(&FrameTick<'_>)>,
        cancel: &CancelToken,
    ) -> FramecastResult<VideoArtifact> {
        validate_sections(sections)?;
        let ordered = ordered_sections(sections);

        // Paint caches: one build per section per run.
        let paint_opts = self.cfg.paint.clone();
        let mut caches = Vec::with_capacity(ordered.len());
        for section in &ordered {
            caches.push(SectionPaintCache::build(
                section,
                &paint_opts,
                self.cfg.canvas,
                &mut self.painter,
            )?);
        }

        // One-shot audio decode, before streaming starts. Non-fatal.
        let mut audio_guard = TempFileGuard(None);
        let audio = match audio_bytes {
            Some(bytes) => match decode_audio_bytes(bytes) {
                Ok(track) => {
                    let path = temp_track_path();
                    write_track_to_f32le_file(&track, &path)?;
                    audio_guard.0 = Some(path.clone());
                    Some(AudioInputConfig {
                        path,
                        sample_rate: track.sample_rate,
                        channels: track.channels,
                    })
                }
                Err(e) => {
                    tracing::warn!("audio decode failed, continuing without audio: {e}");
                    None
                }
            },
            None => None,
        };

        let bg = self.cfg.paint.background;
        encoder.begin(&EncoderConfig {
            canvas: self.cfg.canvas,
            fps: self.cfg.fps,
            bitrate_bps: self.cfg.bitrate_bps,
            flush_interval: self.cfg.flush_interval,
            codec_preference: self.cfg.codec_preference.clone(),
            bg_rgba: [bg.r, bg.g, bg.b, 255],
            audio,
        })?;

        let canvas = self.cfg.canvas;
        let fps = self.cfg.fps;

        // Single writer: the surface is painted then read for the encoder push
        // within one tick; nothing else touches it for the run's duration.
        let Self {
            painter,
            surface,
            sequencer,
            ..
        } = self;
        let run = sequencer.run(
            &ordered,
            cancel,
            &mut |tick| {
                let cache = &caches[tick.section_index];
                painter.paint(cache, surface, tick.progress, tick.timestamp_secs)?;
                encoder.push_frame(tick.frame, surface.data_as_u8_slice())?;
                if let Some(cb) = on_frame.as_deref_mut() {
                    cb(tick);
                }
                Ok(())
            },
            on_progress,
        );

        let stats = match run {
            Ok(stats) => stats,
            Err(e) => {
                // Best-effort teardown; the original error is what propagates.
                encoder.abort();
                return Err(e);
            }
        };

        let chunks = encoder.finish()?;
        let descriptor = encoder
            .descriptor()
            .ok_or_else(|| FramecastError::encode("encoder finished without a descriptor"))?;

        let mut data = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
        for chunk in &chunks {
            data.extend_from_slice(&chunk.data);
        }

        tracing::info!(
            frames = stats.frames_emitted,
            bytes = data.len(),
            mime = %descriptor.mime_type(),
            "render complete"
        );

        Ok(VideoArtifact {
            data,
            descriptor,
            canvas,
            fps,
            frame_count: stats.frames_emitted,
            duration_secs: stats.frames_emitted as f64 * fps.frame_duration_secs(),
        })
    }
}
