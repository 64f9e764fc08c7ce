use std::borrow::Cow;

use crate::foundation::error::{FramecastError, FramecastResult};

/// RGBA8 brush color carried through Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Text-width measurement seam used by the word-wrap algorithm.
///
/// The production implementation shapes through Parley; tests substitute a
/// deterministic fake so wrapping stays reproducible without fonts installed.
pub trait TextMeasure {
    /// Measured advance width of `text` at `size_px`, in pixels.
    fn measure(&mut self, text: &str, size_px: f32) -> FramecastResult<f32>;
}

/// Stateful helper for building Parley text layouts from a font family stack.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    family: String,
}

impl TextLayoutEngine {
    /// Construct a layout engine resolving against `family` (CSS-style font
    /// stack source, e.g. `"sans-serif"`).
    pub(crate) fn new(family: impl Into<String>) -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            family: family.into(),
        }
    }

    /// Shape and lay out plain text at `size_px`.
    pub(crate) fn layout_plain(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> FramecastResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(FramecastError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

impl TextMeasure for TextLayoutEngine {
    fn measure(&mut self, text: &str, size_px: f32) -> FramecastResult<f32> {
        let layout = self.layout_plain(text, size_px, TextBrushRgba8::default(), None)?;
        Ok(layout.width())
    }
}
