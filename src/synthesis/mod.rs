//! Speech-synthesis collaborator seam.
//!
//! Synthesis is a black box to this crate: it either produces encoded audio
//! bytes for the narration track, or reports "no audio". Unavailability must
//! never fail the pipeline.

use crate::foundation::error::FramecastResult;

/// Voice controls forwarded to the synthesizer.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeechOptions {
    /// Speaking rate multiplier, 1.0 = natural.
    pub rate: f32,
    /// Pitch multiplier, 1.0 = natural.
    pub pitch: f32,
    /// Output volume, 0.0–1.0.
    pub volume: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// External text-to-speech collaborator.
pub trait SpeechSynthesizer {
    /// Synthesize `text` into encoded audio bytes.
    ///
    /// `on_progress` receives percent values in 0–100. `Ok(None)` means the
    /// synthesizer is unavailable or produced nothing; callers treat that as
    /// "no audio", not as a failure.
    fn synthesize(
        &mut self,
        text: &str,
        opts: &SpeechOptions,
        on_progress: &mut dyn FnMut(u8),
    ) -> FramecastResult<Option<Vec<u8>>>;
}

/// Synthesizer that is never available. The default collaborator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSynthesizer;

impl SpeechSynthesizer for NullSynthesizer {
    fn synthesize(
        &mut self,
        _text: &str,
        _opts: &SpeechOptions,
        on_progress: &mut dyn FnMut(u8),
    ) -> FramecastResult<Option<Vec<u8>>> {
        on_progress(100);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_synthesizer_reports_done_and_no_audio() {
        let mut synth = NullSynthesizer;
        let mut last = 0u8;
        let out = synth
            .synthesize("hello", &SpeechOptions::default(), &mut |p| last = p)
            .unwrap();
        assert!(out.is_none());
        assert_eq!(last, 100);
    }
}
