use std::time::{Duration, Instant};

use crate::foundation::{
    core::{Fps, FrameIndex},
    error::{FramecastError, FramecastResult},
};
use crate::script::model::Section;
use crate::sequence::cancel::CancelToken;

/// Minimum wall-clock gap between progress callbacks (≈8/s ceiling).
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(120);

/// Loop state for one frame. Borrowed, not persisted.
#[derive(Clone, Copy, Debug)]
pub struct FrameTick<'a> {
    /// Section this frame belongs to.
    pub section: &'a Section,
    /// Index of the section within the ordered run.
    pub section_index: usize,
    /// 0-based frame index within the section.
    pub frame_in_section: u64,
    /// Global frame index, continuous across section boundaries.
    pub frame: FrameIndex,
    /// Total frames in the run.
    pub total_frames: u64,
    /// Animation progress within the section, `frame_in_section / count`.
    ///
    /// Strictly less than 1.0 on every frame, including the last.
    pub progress: f64,
    /// Timeline position in seconds, continuous across sections.
    pub timestamp_secs: f64,
}

/// Throttled percent-complete report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameProgress {
    /// Percent of frames emitted so far, 0–100.
    pub percent: u8,
    /// Frames emitted so far.
    pub current_frame: u64,
    /// Total frames in the run.
    pub total_frames: u64,
}

/// Counters for one sequencer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceStats {
    /// Frames handed to the frame callback.
    pub frames_emitted: u64,
    /// Progress callbacks actually delivered after throttling.
    pub progress_reports: u64,
}

/// Drives the frame loop: per-section frame counts, real-time pacing, per-frame
/// cancellation polling and throttled progress.
///
/// For frame `i` of a section with duration `D` at rate `F`:
/// `count = ceil(D×F)`, `progress = i/count`, `timestamp = cumulative + i/F`.
pub struct FrameSequencer {
    fps: Fps,
    realtime_pacing: bool,
    last_progress_at: Option<Instant>,
}

impl FrameSequencer {
    /// Construct a sequencer. With `realtime_pacing` the loop sleeps toward a
    /// per-frame deadline of `1/fps` so a downstream real-time consumer drains
    /// in sync; without it frames are produced as fast as they paint.
    pub fn new(fps: Fps, realtime_pacing: bool) -> Self {
        Self {
            fps,
            realtime_pacing,
            last_progress_at: None,
        }
    }

    /// Run the frame loop over `sections` (already in render order).
    ///
    /// `on_frame` is invoked once per frame in strictly increasing global
    /// order; an error from it aborts the run unchanged. `on_progress` is
    /// throttled to one call per ≥120 ms, with a guaranteed final call at 100%
    /// on the last frame. The throttle timestamp is owned by this instance and
    /// reset on every run.
    pub fn run(
        &mut self,
        sections: &[&Section],
        cancel: &CancelToken,
        on_frame: &mut dyn FnMut(&FrameTick<'_>) -> FramecastResult<()>,
        on_progress: &mut dyn FnMut(FrameProgress),
    ) -> FramecastResult<SequenceStats> {
        if sections.is_empty() {
            return Err(FramecastError::validation("section list must be non-empty"));
        }

        let total_frames: u64 = sections.iter().map(|s| s.frame_count(self.fps)).sum();
        let period_secs = self.fps.frame_duration_secs();

        self.last_progress_at = None;
        let mut stats = SequenceStats::default();
        let started = Instant::now();
        let mut global: u64 = 0;
        let mut cumulative_secs = 0.0f64;

        tracing::debug!(total_frames, fps = self.fps.as_f64(), "sequence start");

        for (section_index, section) in sections.iter().copied().enumerate() {
            let count = section.frame_count(self.fps);
            for i in 0..count {
                if cancel.is_cancelled() {
                    tracing::debug!(frame = global, "cancellation observed");
                    return Err(FramecastError::cancelled(format!(
                        "cancelled at frame {global} of {total_frames}"
                    )));
                }

                let tick = FrameTick {
                    section,
                    section_index,
                    frame_in_section: i,
                    frame: FrameIndex(global),
                    total_frames,
                    progress: i as f64 / count as f64,
                    timestamp_secs: cumulative_secs + i as f64 * period_secs,
                };
                on_frame(&tick)?;
                stats.frames_emitted += 1;
                global += 1;

                let is_final = global == total_frames;
                if is_final || self.progress_due() {
                    self.last_progress_at = Some(Instant::now());
                    stats.progress_reports += 1;
                    on_progress(FrameProgress {
                        percent: ((global * 100) / total_frames) as u8,
                        current_frame: global,
                        total_frames,
                    });
                }

                if self.realtime_pacing && !is_final {
                    let deadline = started + Duration::from_secs_f64(global as f64 * period_secs);
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    }
                }
            }
            cumulative_secs += count as f64 * period_secs;
        }

        tracing::debug!(frames = stats.frames_emitted, "sequence complete");
        Ok(stats)
    }

    fn progress_due(&self) -> bool {
        match self.last_progress_at {
            None => true,
            Some(at) => at.elapsed() >= MIN_PROGRESS_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::model::SectionKind;

    fn section(id: &str, duration_secs: f64, order: u32) -> Section {
        Section {
            id: id.to_string(),
            kind: SectionKind::Core,
            title: id.to_string(),
            content: "body".to_string(),
            duration_secs,
            order,
        }
    }

    fn collect_ticks(
        sections: &[Section],
        fps: u32,
    ) -> (Vec<(u64, f64, f64)>, Vec<FrameProgress>, SequenceStats) {
        let refs: Vec<&Section> = sections.iter().collect();
        let mut seq = FrameSequencer::new(Fps::whole(fps).unwrap(), false);
        let mut ticks = Vec::new();
        let mut reports = Vec::new();
        let stats = seq
            .run(
                &refs,
                &CancelToken::new(),
                &mut |t| {
                    ticks.push((t.frame.0, t.progress, t.timestamp_secs));
                    Ok(())
                },
                &mut |p| reports.push(p),
            )
            .unwrap();
        (ticks, reports, stats)
    }

    #[test]
    fn one_second_at_ten_fps_is_exactly_ten_frames() {
        let sections = vec![section("s", 1.0, 0)];
        let (ticks, reports, stats) = collect_ticks(&sections, 10);

        assert_eq!(ticks.len(), 10);
        assert_eq!(stats.frames_emitted, 10);
        for (i, &(frame, progress, _)) in ticks.iter().enumerate() {
            assert_eq!(frame, i as u64);
            assert!((progress - i as f64 * 0.1).abs() < 1e-12);
            assert!(progress < 1.0, "section progress must never reach 1.0");
        }
        assert_eq!(reports.last().unwrap().percent, 100);
        assert_eq!(reports.last().unwrap().current_frame, 10);
    }

    #[test]
    fn timestamps_are_continuous_across_sections() {
        // ceil(2×2) + ceil(3×2) = 10 frames, timestamps 0.0..4.5 in 0.5 steps.
        let sections = vec![section("a", 2.0, 0), section("b", 3.0, 1)];
        let (ticks, _, _) = collect_ticks(&sections, 2);

        assert_eq!(ticks.len(), 10);
        for (i, &(frame, _, ts)) in ticks.iter().enumerate() {
            assert_eq!(frame, i as u64);
            assert!((ts - i as f64 * 0.5).abs() < 1e-12);
        }
        assert!((ticks.last().unwrap().2 - 4.5).abs() < 1e-12);
    }

    #[test]
    fn fractional_durations_round_frames_up() {
        let sections = vec![section("a", 1.05, 0), section("b", 0.33, 1)];
        let (ticks, _, _) = collect_ticks(&sections, 10);
        // ceil(10.5) + ceil(3.3) = 15
        assert_eq!(ticks.len(), 15);
    }

    #[test]
    fn cancel_before_first_frame_emits_nothing() {
        let sections = vec![section("s", 1.0, 0)];
        let refs: Vec<&Section> = sections.iter().collect();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut seq = FrameSequencer::new(Fps::whole(10).unwrap(), false);
        let mut frames = 0u64;
        let err = seq
            .run(
                &refs,
                &cancel,
                &mut |_| {
                    frames += 1;
                    Ok(())
                },
                &mut |_| {},
            )
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(frames, 0);
    }

    #[test]
    fn cancel_mid_run_stops_at_the_next_boundary() {
        let sections = vec![section("s", 1.0, 0)];
        let refs: Vec<&Section> = sections.iter().collect();
        let cancel = CancelToken::new();

        let mut seq = FrameSequencer::new(Fps::whole(10).unwrap(), false);
        let mut frames = 0u64;
        let err = seq
            .run(
                &refs,
                &cancel,
                &mut |t| {
                    frames += 1;
                    if t.frame.0 == 2 {
                        cancel.cancel();
                    }
                    Ok(())
                },
                &mut |_| {},
            )
            .unwrap_err();
        assert!(err.is_cancelled());
        // Frames 0..=2 ran; the in-flight frame finished, frame 3 never started.
        assert_eq!(frames, 3);
    }

    #[test]
    fn frame_callback_error_propagates_unchanged() {
        let sections = vec![section("s", 1.0, 0)];
        let refs: Vec<&Section> = sections.iter().collect();
        let mut seq = FrameSequencer::new(Fps::whole(10).unwrap(), false);
        let err = seq
            .run(
                &refs,
                &CancelToken::new(),
                &mut |t| {
                    if t.frame.0 == 4 {
                        Err(FramecastError::encode("sink full"))
                    } else {
                        Ok(())
                    }
                },
                &mut |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, FramecastError::Encode(_)));
    }

    #[test]
    fn progress_is_throttled_but_finishes_at_100() {
        // 500 unpaced frames complete in well under 120 ms, so only the first
        // and final reports may pass the throttle gate.
        let sections = vec![section("s", 0.5, 0)];
        let (ticks, reports, stats) = collect_ticks(&sections, 1000);

        assert_eq!(ticks.len(), 500);
        assert!(stats.progress_reports < ticks.len() as u64 / 10);
        assert_eq!(reports.last().unwrap().percent, 100);
        let mut prev = 0u8;
        for r in &reports {
            assert!(r.percent >= prev, "progress must be monotonic in a run");
            prev = r.percent;
        }
    }

    #[test]
    fn realtime_pacing_spans_the_content_duration() {
        let sections = vec![section("s", 0.3, 0)];
        let refs: Vec<&Section> = sections.iter().collect();
        let mut seq = FrameSequencer::new(Fps::whole(10).unwrap(), true);
        let started = Instant::now();
        seq.run(&refs, &CancelToken::new(), &mut |_| Ok(()), &mut |_| {})
            .unwrap();
        // 3 frames, deadlines at 0.1s and 0.2s; no sleep after the final frame.
        assert!(started.elapsed() >= Duration::from_millis(180));
    }
}
