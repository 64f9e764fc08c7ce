use std::collections::HashMap;
use std::sync::Arc;

use kurbo::Shape as _;

use crate::foundation::{
    core::Canvas,
    error::{FramecastError, FramecastResult},
    math::mul_div255_u8,
};
use crate::paint::cache::{GradientSpec, PaintOptions, SectionPaintCache, CONTENT_BOX_FRACTION};
use crate::paint::text::{TextBrushRgba8, TextLayoutEngine, TextMeasure};

/// Content fade curve over section progress.
///
/// Ramps 0→1 over `[0, 0.1]`, holds 1 over `(0.1, 0.9)`, ramps 1→0 over
/// `[0.9, 1]`. Continuous at both knees.
pub fn fade_opacity(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    if p < 0.1 {
        p / 0.1
    } else if p <= 0.9 {
        1.0
    } else {
        (1.0 - p) / 0.1
    }
}

/// Number of content lines revealed at `progress`.
///
/// `min(n, ceil(n × p × 2))` — every line is on screen by 50% progress, so the
/// back half of a section reads as settled.
pub fn visible_lines(progress: f64, line_count: usize) -> usize {
    if line_count == 0 {
        return 0;
    }
    let revealed = (line_count as f64 * progress.clamp(0.0, 1.0) * 2.0).ceil() as usize;
    revealed.min(line_count)
}

/// Format a timeline position as `mm:ss`.
pub fn format_timestamp(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct GradientKey {
    color: [u8; 4],
    peak_alpha: u8,
    radius_bits: u32,
    w: u32,
    h: u32,
}

/// Stateless-per-frame painter for section frames.
///
/// Holds reusable machinery only (render context, text contexts, gradient
/// raster cache); every [`SectionPainter::paint`] call fully repaints the
/// destination surface, so repeated calls on the same surface are safe.
pub struct SectionPainter {
    canvas: Canvas,
    opts: PaintOptions,
    ctx: Option<vello_cpu::RenderContext>,
    text_engine: TextLayoutEngine,
    gradient_cache: HashMap<GradientKey, vello_cpu::Image>,
    // Glyph font data keyed by the source blob id, built once per font.
    font_cache: HashMap<u64, vello_cpu::peniko::FontData>,
}

impl SectionPainter {
    /// Construct a painter for `canvas` with the given styling.
    pub fn new(canvas: Canvas, opts: PaintOptions) -> Self {
        let text_engine = TextLayoutEngine::new(opts.font_family.clone());
        Self {
            canvas,
            opts,
            ctx: None,
            text_engine,
            gradient_cache: HashMap::new(),
            font_cache: HashMap::new(),
        }
    }

    /// Canvas this painter targets.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Styling in effect.
    pub fn options(&self) -> &PaintOptions {
        &self.opts
    }

    /// Paint one frame into `surface`.
    ///
    /// Fully repaints: background, radial gradient overlay, title, revealed
    /// content lines (fade driven by `progress`), badge, `mm:ss` timestamp.
    pub fn paint(
        &mut self,
        cache: &SectionPaintCache,
        surface: &mut vello_cpu::Pixmap,
        progress: f64,
        timestamp_secs: f64,
    ) -> FramecastResult<()> {
        let w = u32::from(surface.width());
        let h = u32::from(surface.height());
        if w != self.canvas.width || h != self.canvas.height {
            return Err(FramecastError::paint(format!(
                "surface size mismatch: got {w}x{h}, expected {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }

        let gradient = self.gradient_image(cache.gradient)?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == surface.width() && ctx.height() == surface.height() => ctx,
            _ => vello_cpu::RenderContext::new(surface.width(), surface.height()),
        };
        ctx.reset();

        let wf = w as f64;
        let hf = h as f64;
        let full = vello_cpu::kurbo::Rect::new(0.0, 0.0, wf, hf);

        // Background.
        let bg = self.opts.background;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(bg.r, bg.g, bg.b, 255));
        ctx.fill_rect(&full);

        // Centered radial accent glow.
        ctx.set_paint(gradient);
        ctx.fill_rect(&full);

        let text = self.opts.text_color;
        let text_brush = TextBrushRgba8 {
            r: text.r,
            g: text.g,
            b: text.b,
            a: 255,
        };
        let font_size = self.opts.font_size_px;

        // Title at a fixed anchor.
        let title_layout =
            self.text_engine
                .layout_plain(&cache.title, font_size * 1.5, text_brush, None)?;
        self.draw_layout(&mut ctx, &title_layout, wf * 0.1, hf * 0.08);

        // Revealed content lines, centered around the content-box midpoint.
        let shown = visible_lines(progress, cache.lines.len());
        let alpha = fade_opacity(progress) as f32;
        if shown > 0 && alpha > 0.0 {
            let faded = alpha < 1.0;
            if faded {
                ctx.push_opacity_layer(alpha);
            }

            let line_height = f64::from(font_size) * 1.5;
            let mid = hf * 0.55;
            let n = cache.lines.len();
            let x = wf * (1.0 - f64::from(CONTENT_BOX_FRACTION)) / 2.0;
            for i in 0..shown {
                let y = mid + (i as f64 - (n as f64 - 1.0) / 2.0) * line_height;
                let layout =
                    self.text_engine
                        .layout_plain(&cache.lines[i], font_size, text_brush, None)?;
                self.draw_layout(&mut ctx, &layout, x, y);
            }

            if faded {
                ctx.pop_layer();
            }
        }

        // Badge: rounded rect top-right with the kind label.
        let badge_size = font_size * 0.6;
        let label_w = f64::from(self.text_engine.measure(cache.badge.label, badge_size)?);
        let pad = f64::from(badge_size) * 0.6;
        let badge_w = label_w + pad * 2.0;
        let badge_h = f64::from(badge_size) + pad * 1.2;
        let badge_x = wf - badge_w - wf * 0.04;
        let badge_y = hf * 0.06;

        let rr = kurbo::RoundedRect::new(0.0, 0.0, badge_w, badge_h, badge_h / 2.0);
        let mut badge_path = vello_cpu::kurbo::BezPath::new();
        for el in rr.path_elements(0.1) {
            badge_path.push(el);
        }
        let bc = cache.badge.color;
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((badge_x, badge_y)));
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(bc.r, bc.g, bc.b, 255));
        ctx.fill_path(&badge_path);

        let label_layout = self.text_engine.layout_plain(
            cache.badge.label,
            badge_size,
            TextBrushRgba8 {
                r: bg.r,
                g: bg.g,
                b: bg.b,
                a: 255,
            },
            None,
        )?;
        self.draw_layout(&mut ctx, &label_layout, badge_x + pad, badge_y + pad * 0.6);

        // Timeline position, bottom-left.
        let stamp_layout = self.text_engine.layout_plain(
            &format_timestamp(timestamp_secs),
            font_size * 0.7,
            text_brush,
            None,
        )?;
        self.draw_layout(&mut ctx, &stamp_layout, wf * 0.04, hf * 0.9);

        ctx.flush();
        ctx.render_to_pixmap(surface);
        self.ctx = Some(ctx);
        Ok(())
    }

    fn draw_layout(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &parley::Layout<TextBrushRgba8>,
        x: f64,
        y: f64,
    ) {
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y)));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let font = run.run().font();
                let font_data = self
                    .font_cache
                    .entry(font.data.id())
                    .or_insert_with(|| {
                        vello_cpu::peniko::FontData::new(
                            vello_cpu::peniko::Blob::from(font.data.data().to_vec()),
                            font.index,
                        )
                    })
                    .clone();
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font_data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }

    fn gradient_image(&mut self, spec: GradientSpec) -> FramecastResult<vello_cpu::Image> {
        let key = GradientKey {
            color: [spec.color.r, spec.color.g, spec.color.b, spec.color.a],
            peak_alpha: spec.peak_alpha,
            radius_bits: spec.radius_frac.to_bits(),
            w: self.canvas.width,
            h: self.canvas.height,
        };
        if let Some(img) = self.gradient_cache.get(&key).cloned() {
            return Ok(img);
        }

        let img = radial_gradient_image(self.canvas, spec)?;
        self.gradient_cache.insert(key, img.clone());
        Ok(img)
    }
}

impl TextMeasure for SectionPainter {
    fn measure(&mut self, text: &str, size_px: f32) -> FramecastResult<f32> {
        self.text_engine.measure(text, size_px)
    }
}

/// Rasterize a centered radial gradient into a reusable paint image.
fn radial_gradient_image(canvas: Canvas, spec: GradientSpec) -> FramecastResult<vello_cpu::Image> {
    let w = canvas.width;
    let h = canvas.height;
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let diag = ((w as f32).powi(2) + (h as f32).powi(2)).sqrt();
    let radius = (diag * spec.radius_frac).max(1.0);

    let mut bytes = vec![0u8; (w as usize).saturating_mul(h as usize).saturating_mul(4)];
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let t = (1.0 - (dx * dx + dy * dy).sqrt() / radius).clamp(0.0, 1.0);
            let a = (f32::from(spec.peak_alpha) * t).round() as u8;
            if a == 0 {
                continue;
            }
            let idx = ((y as usize) * (w as usize) + (x as usize)) * 4;
            bytes[idx] = mul_div255_u8(u16::from(spec.color.r), u16::from(a));
            bytes[idx + 1] = mul_div255_u8(u16::from(spec.color.g), u16::from(a));
            bytes[idx + 2] = mul_div255_u8(u16::from(spec.color.b), u16::from(a));
            bytes[idx + 3] = a;
        }
    }

    rgba_premul_to_image(&bytes, w, h)
}

pub(crate) fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> FramecastResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| FramecastError::paint("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| FramecastError::paint("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(FramecastError::paint("pixmap byte len mismatch"));
    }

    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

fn rgba_premul_to_image(
    bytes_premul: &[u8],
    width: u32,
    height: u32,
) -> FramecastResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(bytes_premul, width, height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::model::{Section, SectionKind};

    #[test]
    fn fade_opacity_endpoints_and_plateau() {
        assert_eq!(fade_opacity(0.0), 0.0);
        assert_eq!(fade_opacity(0.5), 1.0);
        assert_eq!(fade_opacity(1.0), 0.0);
        assert_eq!(fade_opacity(0.3), 1.0);
        assert_eq!(fade_opacity(0.9), 1.0);
    }

    #[test]
    fn fade_opacity_is_continuous_at_the_knees() {
        let eps = 1e-9;
        assert!((fade_opacity(0.1 - eps) - fade_opacity(0.1 + eps)).abs() < 1e-6);
        assert!((fade_opacity(0.9 - eps) - fade_opacity(0.9 + eps)).abs() < 1e-6);
        assert!((fade_opacity(0.1) - 1.0).abs() < 1e-12);
        assert!((fade_opacity(0.9) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fade_opacity_clamps_out_of_range_progress() {
        assert_eq!(fade_opacity(-1.0), 0.0);
        assert_eq!(fade_opacity(2.0), 0.0);
    }

    #[test]
    fn visible_lines_is_monotonic_and_saturates_at_half() {
        let n = 7;
        let mut prev = 0;
        for step in 0..=100 {
            let p = step as f64 / 100.0;
            let v = visible_lines(p, n);
            assert!(v >= prev, "not monotonic at p={p}");
            prev = v;
        }
        assert_eq!(visible_lines(0.5, n), n);
        assert_eq!(visible_lines(1.0, n), n);
        assert_eq!(visible_lines(0.0, n), 0);
        assert_eq!(visible_lines(0.3, 0), 0);
    }

    #[test]
    fn timestamp_formats_mm_ss() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(9.9), "00:09");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(600.0), "10:00");
        assert_eq!(format_timestamp(-3.0), "00:00");
    }

    #[test]
    fn paint_fully_repaints_and_is_idempotent() {
        let canvas = Canvas {
            width: 64,
            height: 36,
        };
        let section = Section {
            id: "s0".to_string(),
            kind: SectionKind::Hook,
            title: "Hello".to_string(),
            content: "alpha beta gamma delta".to_string(),
            duration_secs: 1.0,
            order: 0,
        };
        let opts = PaintOptions::default();
        let mut painter = SectionPainter::new(canvas, opts.clone());
        let cache = SectionPaintCache::build(&section, &opts, canvas, &mut painter).unwrap();

        let mut surface = vello_cpu::Pixmap::new(64, 36);
        painter.paint(&cache, &mut surface, 0.4, 12.0).unwrap();
        let first = surface.data_as_u8_slice().to_vec();
        // Background is not black, so the surface must have been written.
        assert!(first.iter().any(|&b| b != 0));

        painter.paint(&cache, &mut surface, 0.4, 12.0).unwrap();
        assert_eq!(surface.data_as_u8_slice(), first.as_slice());

        // A different progress still fully repaints over the old pixels.
        painter.paint(&cache, &mut surface, 0.95, 12.0).unwrap();
        painter.paint(&cache, &mut surface, 0.4, 12.0).unwrap();
        assert_eq!(surface.data_as_u8_slice(), first.as_slice());
    }

    #[test]
    fn paint_rejects_mismatched_surface() {
        let canvas = Canvas {
            width: 64,
            height: 36,
        };
        let opts = PaintOptions::default();
        let mut painter = SectionPainter::new(canvas, opts.clone());
        let section = Section {
            id: "s0".to_string(),
            kind: SectionKind::Core,
            title: "T".to_string(),
            content: "c".to_string(),
            duration_secs: 1.0,
            order: 0,
        };
        let cache = SectionPaintCache::build(&section, &opts, canvas, &mut painter).unwrap();
        let mut wrong = vello_cpu::Pixmap::new(32, 32);
        assert!(painter.paint(&cache, &mut wrong, 0.5, 0.0).is_err());
    }
}
