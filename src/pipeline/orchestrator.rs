use std::time::Duration;

use crate::encode::StreamEncoder;
use crate::encode::ffmpeg::FfmpegStreamEncoder;
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::render::streamer::{RenderConfig, StreamingRenderer, VideoArtifact};
use crate::script::model::{Section, ordered_sections, validate_sections};
use crate::sequence::cancel::CancelToken;
use crate::synthesis::{NullSynthesizer, SpeechOptions, SpeechSynthesizer};

/// Fixed schedule for the simulated motion pass.
const MOTION_SCHEDULE: [u8; 5] = [0, 25, 50, 75, 100];
const MOTION_STEP_DELAY: Duration = Duration::from_millis(40);

/// Pipeline stage. Stages run strictly in this order and never overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStep {
    /// Speech synthesis (external collaborator).
    Tts,
    /// Frame painting + streaming encode.
    Frames,
    /// Simulated motion pass (fixed schedule, no real processing).
    Motion,
    /// Finalization; fused with frame generation in the streaming path.
    Render,
}

/// Normalized progress event covering every stage.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GenerationProgress {
    /// Active stage.
    pub step: GenerationStep,
    /// Percent complete within the stage, 0–100. Monotonic within a stage.
    pub progress: u8,
    /// Frames emitted so far; `Frames` stage only.
    pub current_frame: Option<u64>,
    /// Total frames in the run; `Frames` stage only.
    pub total_frames: Option<u64>,
    /// Human-readable status.
    pub message: String,
}

impl GenerationProgress {
    fn stage(step: GenerationStep, progress: u8, message: &str) -> Self {
        Self {
            step,
            progress,
            current_frame: None,
            total_frames: None,
            message: message.to_string(),
        }
    }
}

/// Rough wall-clock estimate for generating `sections`, in seconds.
///
/// Content duration ×1.1 (the paced encode keeps pace with playback, plus
/// margin), 1.5 s of synthesis per section, 3 s fixed overhead for startup,
/// the motion pass and finalization.
pub fn estimate_generation_time(sections: &[Section]) -> f64 {
    let content: f64 = sections.iter().map(|s| s.duration_secs.max(0.0)).sum();
    content * 1.1 + sections.len() as f64 * 1.5 + 3.0
}

/// Sequences the four generation stages and normalizes their progress into one
/// [`GenerationProgress`] stream.
///
/// Any non-recoverable stage failure fails the whole run; there is no internal
/// retry. Cancellation is observed by whichever stage is active. A generator
/// drives one run at a time; concurrent runs take separate instances and are
/// intentionally not deduplicated.
pub struct VideoGenerator {
    cfg: RenderConfig,
    speech: SpeechOptions,
    synthesizer: Box<dyn SpeechSynthesizer>,
    cancel: CancelToken,
}

impl VideoGenerator {
    /// Generator with the default (never-available) synthesizer.
    pub fn new(cfg: RenderConfig) -> Self {
        Self {
            cfg,
            speech: SpeechOptions::default(),
            synthesizer: Box::new(NullSynthesizer),
            cancel: CancelToken::new(),
        }
    }

    /// Swap in a speech-synthesis collaborator.
    pub fn with_synthesizer(mut self, synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Voice controls forwarded to the synthesizer.
    pub fn with_speech_options(mut self, speech: SpeechOptions) -> Self {
        self.speech = speech;
        self
    }

    /// Request cancellation; the active stage observes it at its next
    /// boundary. The flag is sticky: a cancelled generator stays cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Shared token for wiring external deadline logic.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Generate a video artifact using the system ffmpeg encoder.
    pub fn generate(
        &mut self,
        sections: &[Section],
        on_progress: &mut dyn FnMut(&GenerationProgress),
    ) -> FramecastResult<VideoArtifact> {
        let mut encoder = FfmpegStreamEncoder::new();
        self.generate_with_encoder(sections, &mut encoder, on_progress)
    }

    /// Generate through a caller-supplied encoder.
    pub fn generate_with_encoder(
        &mut self,
        sections: &[Section],
        encoder: &mut dyn StreamEncoder,
        on_progress: &mut dyn FnMut(&GenerationProgress),
    ) -> FramecastResult<VideoArtifact> {
        validate_sections(sections)?;
        self.check_cancelled("before synthesis")?;

        // Stage 1: speech synthesis. Failure or unavailability downgrades to
        // "no audio" — the run continues.
        on_progress(&GenerationProgress::stage(
            GenerationStep::Tts,
            0,
            "synthesizing narration",
        ));
        let narration = narration_script(sections);
        let audio = match self.synthesizer.synthesize(&narration, &self.speech, &mut |p| {
            on_progress(&GenerationProgress::stage(
                GenerationStep::Tts,
                p.min(100),
                "synthesizing narration",
            ));
        }) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("speech synthesis failed, continuing without narration: {e}");
                None
            }
        };
        self.check_cancelled("after synthesis")?;

        // Stage 2: frame generation, streamed straight into the encoder.
        tracing::info!(sections = sections.len(), "starting frame render");
        let mut renderer = StreamingRenderer::new(self.cfg.clone())?;
        let artifact = renderer.render_from_sections(
            sections,
            audio.as_deref(),
            encoder,
            &mut |fp| {
                on_progress(&GenerationProgress {
                    step: GenerationStep::Frames,
                    progress: fp.percent,
                    current_frame: Some(fp.current_frame),
                    total_frames: Some(fp.total_frames),
                    message: format!("frame {} of {}", fp.current_frame, fp.total_frames),
                });
            },
            None,
            &self.cancel,
        )?;

        // Stage 3: motion pass. Simulated on a fixed schedule; no processing
        // happens here yet.
        for pct in MOTION_SCHEDULE {
            self.check_cancelled("during motion pass")?;
            on_progress(&GenerationProgress::stage(
                GenerationStep::Motion,
                pct,
                "applying motion pass",
            ));
            std::thread::sleep(MOTION_STEP_DELAY);
        }

        // Stage 4: render. Fused with frame generation in the streaming path,
        // so the artifact already exists by the time this stage reports.
        on_progress(&GenerationProgress::stage(
            GenerationStep::Render,
            100,
            "artifact finalized",
        ));
        tracing::info!(bytes = artifact.data.len(), "generation complete");
        Ok(artifact)
    }

    fn check_cancelled(&self, at: &str) -> FramecastResult<()> {
        if self.cancel.is_cancelled() {
            return Err(FramecastError::cancelled(format!("cancelled {at}")));
        }
        Ok(())
    }
}

/// Narration text handed to the synthesizer: titles and bodies in render order.
fn narration_script(sections: &[Section]) -> String {
    let ordered = ordered_sections(sections);
    let mut out = String::new();
    for section in ordered {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(section.title.trim());
        out.push_str(". ");
        out.push_str(section.content.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{Codec, InMemoryEncoder};
    use crate::foundation::core::{Canvas, Fps};
    use crate::script::model::SectionKind;

    fn section(id: &str, duration_secs: f64, order: u32) -> Section {
        Section {
            id: id.to_string(),
            kind: SectionKind::Summary,
            title: format!("Title {id}"),
            content: "alpha beta gamma".to_string(),
            duration_secs,
            order,
        }
    }

    fn test_config() -> RenderConfig {
        RenderConfig {
            canvas: Canvas {
                width: 64,
                height: 36,
            },
            fps: Fps { num: 10, den: 1 },
            realtime_pacing: false,
            ..RenderConfig::default()
        }
    }

    struct FailingSynthesizer;
    impl SpeechSynthesizer for FailingSynthesizer {
        fn synthesize(
            &mut self,
            _text: &str,
            _opts: &SpeechOptions,
            _on_progress: &mut dyn FnMut(u8),
        ) -> FramecastResult<Option<Vec<u8>>> {
            Err(FramecastError::synthesis("voice model missing"))
        }
    }

    struct GarbageAudioSynthesizer;
    impl SpeechSynthesizer for GarbageAudioSynthesizer {
        fn synthesize(
            &mut self,
            _text: &str,
            _opts: &SpeechOptions,
            on_progress: &mut dyn FnMut(u8),
        ) -> FramecastResult<Option<Vec<u8>>> {
            on_progress(100);
            Ok(Some(vec![0xde, 0xad, 0xbe, 0xef]))
        }
    }

    fn step_rank(step: GenerationStep) -> u8 {
        match step {
            GenerationStep::Tts => 0,
            GenerationStep::Frames => 1,
            GenerationStep::Motion => 2,
            GenerationStep::Render => 3,
        }
    }

    #[test]
    fn stages_run_in_order_and_never_overlap() {
        let mut generator = VideoGenerator::new(test_config());
        let mut enc = InMemoryEncoder::new();
        let mut reports: Vec<GenerationProgress> = Vec::new();
        let artifact = generator
            .generate_with_encoder(&[section("a", 0.3, 0)], &mut enc, &mut |p| {
                reports.push(p.clone())
            })
            .unwrap();

        assert_eq!(artifact.frame_count, 3);
        assert!(!reports.is_empty());

        let mut prev_rank = 0u8;
        let mut prev_progress_in_step = 0u8;
        for report in &reports {
            let rank = step_rank(report.step);
            assert!(rank >= prev_rank, "steps must be strictly sequential");
            if rank > prev_rank {
                prev_progress_in_step = 0;
            }
            assert!(
                report.progress >= prev_progress_in_step,
                "progress must be monotonic within a step"
            );
            prev_rank = rank;
            prev_progress_in_step = report.progress;
        }

        let last = reports.last().unwrap();
        assert_eq!(last.step, GenerationStep::Render);
        assert_eq!(last.progress, 100);

        let frames_reports: Vec<_> = reports
            .iter()
            .filter(|r| r.step == GenerationStep::Frames)
            .collect();
        assert!(!frames_reports.is_empty());
        assert_eq!(frames_reports.last().unwrap().total_frames, Some(3));
    }

    #[test]
    fn synthesis_failure_downgrades_to_no_audio() {
        let mut generator =
            VideoGenerator::new(test_config()).with_synthesizer(Box::new(FailingSynthesizer));
        let mut enc = InMemoryEncoder::new();
        let artifact = generator
            .generate_with_encoder(&[section("a", 0.2, 0)], &mut enc, &mut |_| {})
            .unwrap();
        assert_eq!(artifact.frame_count, 2);
        assert!(enc.config().unwrap().audio.is_none());
    }

    #[test]
    fn malformed_synthesized_audio_still_produces_video_only_artifact() {
        let mut generator =
            VideoGenerator::new(test_config()).with_synthesizer(Box::new(GarbageAudioSynthesizer));
        let mut enc = InMemoryEncoder::new();
        let artifact = generator
            .generate_with_encoder(&[section("a", 0.2, 0)], &mut enc, &mut |_| {})
            .unwrap();
        assert_eq!(artifact.frame_count, 2);
        assert!(enc.config().unwrap().audio.is_none());
    }

    #[test]
    fn encoder_setup_failure_fails_the_whole_run() {
        let mut generator = VideoGenerator::new(test_config());
        let mut enc = InMemoryEncoder::new().with_supported(vec![]);
        let mut reports: Vec<GenerationProgress> = Vec::new();
        let err = generator
            .generate_with_encoder(&[section("a", 0.2, 0)], &mut enc, &mut |p| {
                reports.push(p.clone())
            })
            .unwrap_err();
        assert!(matches!(err, FramecastError::Encode(_)));
        assert!(
            reports
                .iter()
                .all(|r| step_rank(r.step) < step_rank(GenerationStep::Motion)),
            "no stage after the failure may report progress"
        );
    }

    #[test]
    fn cancelled_generator_rejects_the_run() {
        let mut generator = VideoGenerator::new(test_config());
        generator.cancel();
        let mut enc = InMemoryEncoder::new();
        let err = generator
            .generate_with_encoder(&[section("a", 0.2, 0)], &mut enc, &mut |_| {})
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(enc.chunk_count(), 0);
    }

    #[test]
    fn empty_section_list_fails_before_any_stage() {
        let mut generator = VideoGenerator::new(test_config());
        let mut enc = InMemoryEncoder::new();
        let mut reports = 0usize;
        let err = generator
            .generate_with_encoder(&[], &mut enc, &mut |_| reports += 1)
            .unwrap_err();
        assert!(matches!(err, FramecastError::Validation(_)));
        assert_eq!(reports, 0);
    }

    #[test]
    fn narration_script_follows_render_order() {
        let sections = vec![section("b", 1.0, 2), section("a", 1.0, 1)];
        let script = narration_script(&sections);
        let a = script.find("Title a").unwrap();
        let b = script.find("Title b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn estimate_scales_with_content() {
        let short = vec![section("a", 5.0, 0)];
        let long = vec![section("a", 5.0, 0), section("b", 30.0, 1)];
        let e_short = estimate_generation_time(&short);
        let e_long = estimate_generation_time(&long);
        assert!(e_short > 5.0);
        assert!(e_long > e_short + 25.0);
    }

    #[test]
    fn codec_fallback_surfaces_in_the_artifact_tag() {
        let mut generator = VideoGenerator::new(test_config());
        let mut enc = InMemoryEncoder::new().with_supported(vec![Codec::Unconstrained]);
        let artifact = generator
            .generate_with_encoder(&[section("a", 0.2, 0)], &mut enc, &mut |_| {})
            .unwrap();
        assert_eq!(artifact.descriptor, Codec::Unconstrained.descriptor());
        assert_eq!(artifact.mime_type(), "video/x-matroska");
    }
}
