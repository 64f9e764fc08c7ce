/// Crate-wide result alias.
pub type FramecastResult<T> = Result<T, FramecastError>;

/// Error taxonomy for the generation pipeline.
///
/// `Cancelled` is a distinct kind so callers can tell an expected, caller
/// initiated abort apart from a real failure.
#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    /// Invalid caller-supplied input (sections, config, dimensions).
    #[error("validation error: {0}")]
    Validation(String),

    /// Frame painting or text layout failure.
    #[error("paint error: {0}")]
    Paint(String),

    /// Streaming encoder setup or mid-run failure.
    #[error("encode error: {0}")]
    Encode(String),

    /// Audio decode failure. Downgraded to "no audio" at the renderer boundary.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-synthesis collaborator failure. Downgraded at the orchestrator
    /// boundary.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Run aborted at a frame boundary after cancellation was observed.
    #[error("generation cancelled: {0}")]
    Cancelled(String),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecastError {
    /// Build a [`FramecastError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FramecastError::Paint`].
    pub fn paint(msg: impl Into<String>) -> Self {
        Self::Paint(msg.into())
    }

    /// Build a [`FramecastError::Encode`].
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`FramecastError::Audio`].
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Build a [`FramecastError::Synthesis`].
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Build a [`FramecastError::Cancelled`].
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Return `true` when this error is the cancellation kind.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FramecastError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            FramecastError::paint("x")
                .to_string()
                .contains("paint error:")
        );
        assert!(
            FramecastError::encode("x")
                .to_string()
                .contains("encode error:")
        );
        assert!(
            FramecastError::audio("x")
                .to_string()
                .contains("audio error:")
        );
        assert!(
            FramecastError::cancelled("x")
                .to_string()
                .contains("generation cancelled:")
        );
    }

    #[test]
    fn cancelled_is_the_only_cancellation_kind() {
        assert!(FramecastError::cancelled("stop").is_cancelled());
        assert!(!FramecastError::encode("boom").is_cancelled());
        assert!(!FramecastError::validation("bad").is_cancelled());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FramecastError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
