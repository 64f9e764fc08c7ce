use crate::foundation::{
    core::{Canvas, Rgba8Premul},
    error::FramecastResult,
};
use crate::paint::text::TextMeasure;
use crate::script::model::{Section, SectionKind};

/// Fraction of the content-box width a packed line may occupy.
const LINE_PACK_FRACTION: f32 = 0.8;

/// Horizontal fraction of the canvas reserved for the content box.
pub(crate) const CONTENT_BOX_FRACTION: f32 = 0.8;

/// Caller-tunable paint styling.
#[derive(Clone, Debug)]
pub struct PaintOptions {
    /// Opaque background color.
    pub background: Rgba8Premul,
    /// Title and content text color.
    pub text_color: Rgba8Premul,
    /// Content font size in pixels; the title is drawn a step larger.
    pub font_size_px: f32,
    /// CSS-style font stack source resolved through the system collection.
    pub font_family: String,
}

impl Default for PaintOptions {
    fn default() -> Self {
        Self {
            background: Rgba8Premul::opaque(16, 20, 24),
            text_color: Rgba8Premul::opaque(240, 244, 248),
            font_size_px: 36.0,
            font_family: "sans-serif".to_string(),
        }
    }
}

/// Accent/badge color for a section kind. Fixed lookup with a neutral fallback.
pub fn accent_color(kind: SectionKind) -> Rgba8Premul {
    match kind {
        SectionKind::Hook => Rgba8Premul::opaque(255, 107, 53),
        SectionKind::Overview => Rgba8Premul::opaque(78, 205, 196),
        SectionKind::Core => Rgba8Premul::opaque(91, 141, 239),
        SectionKind::Myth => Rgba8Premul::opaque(182, 120, 242),
        SectionKind::Summary => Rgba8Premul::opaque(61, 220, 132),
        SectionKind::Other => Rgba8Premul::opaque(136, 146, 166),
    }
}

/// Centered radial gradient descriptor, invariant across animation progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientSpec {
    /// Accent color at the gradient center.
    pub color: Rgba8Premul,
    /// Peak alpha at the center, fading to zero at the edge.
    pub peak_alpha: u8,
    /// Gradient radius as a fraction of the canvas diagonal.
    pub radius_frac: f32,
}

/// Badge drawn in the top-right corner.
#[derive(Clone, Debug, PartialEq)]
pub struct BadgeSpec {
    /// Uppercase kind label.
    pub label: &'static str,
    /// Badge fill color.
    pub color: Rgba8Premul,
}

/// Precomputed per-section drawing inputs.
///
/// Built once per section per run and never mutated in place; everything here
/// is invariant to animation progress.
#[derive(Clone, Debug)]
pub struct SectionPaintCache {
    /// Owning section id.
    pub section_id: String,
    /// Section kind.
    pub kind: SectionKind,
    /// Section title.
    pub title: String,
    /// Word-wrapped content lines.
    pub lines: Vec<String>,
    /// Radial gradient descriptor.
    pub gradient: GradientSpec,
    /// Badge label and color.
    pub badge: BadgeSpec,
}

impl SectionPaintCache {
    /// Build the cache for one section.
    ///
    /// Deterministic given the section, options, canvas and measure function;
    /// performs no I/O.
    pub fn build(
        section: &Section,
        opts: &PaintOptions,
        canvas: Canvas,
        measure: &mut dyn TextMeasure,
    ) -> FramecastResult<Self> {
        let accent = accent_color(section.kind);
        let content_width = canvas.width as f32 * CONTENT_BOX_FRACTION;
        let lines = wrap_content(&section.content, content_width, opts.font_size_px, measure)?;

        Ok(Self {
            section_id: section.id.clone(),
            kind: section.kind,
            title: section.title.clone(),
            lines,
            gradient: GradientSpec {
                color: accent,
                peak_alpha: 64,
                radius_frac: 0.55,
            },
            badge: BadgeSpec {
                label: section.kind.badge_label(),
                color: accent,
            },
        })
    }
}

/// Greedy word wrap.
///
/// Appends the next word while the candidate line measures at or under 80% of
/// `target_width_px`; otherwise starts a new line. A single word that exceeds
/// the budget on its own still becomes its own line.
pub fn wrap_content(
    content: &str,
    target_width_px: f32,
    font_size_px: f32,
    measure: &mut dyn TextMeasure,
) -> FramecastResult<Vec<String>> {
    let budget = target_width_px * LINE_PACK_FRACTION;

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in content.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{current} {word}");
        if measure.measure(&candidate, font_size_px)? <= budget {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    Ok(lines)
}
