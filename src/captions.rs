use std::collections::HashMap;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::Font;

use crate::fonts::FontLibrary;
use crate::schema::CaptionStyle;

/// Trailing sentence punctuation stripped before rendering. Covers ASCII
/// enders and the Devanagari danda / double danda.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', '।', '॥'];

/// Uppercase and strip trailing sentence punctuation. Devanagari text has no
/// case mapping and passes through the uppercasing untouched.
pub fn normalize_caption(text: &str) -> String {
    text.trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .to_uppercase()
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Burns one caption onto a frame: a semi-transparent band across the full
/// width, then the text drawn twice — offset dark shadow, bright foreground.
///
/// The input buffer is never mutated; `compose` returns a fresh RGBA buffer
/// so callers may reuse the decoded frame.
pub struct CaptionPainter {
    fonts: FontLibrary,
    style: CaptionStyle,
    glyph_cache: HashMap<fontdue::layout::GlyphRasterConfig, GlyphBitmap>,
}

impl CaptionPainter {
    pub fn new(fonts: FontLibrary, style: CaptionStyle) -> Self {
        Self {
            fonts,
            style,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    /// Composite `text` onto a copy of `frame` (RGBA, `width * height * 4`).
    pub fn compose(&mut self, frame: &[u8], width: u32, height: u32, text: &str) -> Vec<u8> {
        let mut out = frame.to_vec();
        let caption = normalize_caption(text);

        let font_size = self.style.font_size(width);
        let font = self.fonts.for_text(&caption);
        let (text_w, text_h) = measure_line(font, &caption, font_size);

        let band_top = self.style.anchor.band_top(height);
        let band_height = text_h + self.style.pad_y * 2;
        fill_band(
            &mut out,
            width,
            height,
            band_top,
            band_height,
            self.style.band_color,
        );

        let x = (width.saturating_sub(text_w) / 2) as i32;
        let y = (band_top + self.style.pad_y) as i32;
        let shadow = self.style.shadow_offset;

        draw_line(
            &mut out,
            width,
            height,
            font,
            &mut self.glyph_cache,
            x + shadow,
            y + shadow,
            &caption,
            font_size,
            self.style.shadow_color,
        );
        draw_line(
            &mut out,
            width,
            height,
            font,
            &mut self.glyph_cache,
            x,
            y,
            &caption,
            font_size,
            self.style.fill_color,
        );

        out
    }
}

fn layout_for(font: &Font, text: &str, font_size: f32, x: f32, y: f32) -> Layout {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings {
        x,
        y,
        max_width: None,
        max_height: None,
        horizontal_align: fontdue::layout::HorizontalAlign::Left,
        vertical_align: fontdue::layout::VerticalAlign::Top,
        line_height: 1.0,
        wrap_style: fontdue::layout::WrapStyle::Word,
        wrap_hard_breaks: false,
    });
    layout.append(&[font], &TextStyle::new(text, font_size, 0));
    layout
}

fn measure_line(font: &Font, text: &str, font_size: f32) -> (u32, u32) {
    let layout = layout_for(font, text, font_size, 0.0, 0.0);
    let width = layout
        .glyphs()
        .iter()
        .map(|glyph| glyph.x + glyph.width as f32)
        .fold(0.0_f32, f32::max);
    (width.ceil() as u32, layout.height().ceil() as u32)
}

fn draw_line(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    font: &Font,
    glyph_cache: &mut HashMap<fontdue::layout::GlyphRasterConfig, GlyphBitmap>,
    x: i32,
    y: i32,
    text: &str,
    font_size: f32,
    color: [u8; 4],
) {
    if text.is_empty() {
        return;
    }

    let layout = layout_for(font, text, font_size, x as f32, y as f32);
    for glyph in layout.glyphs() {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let glyph_bitmap = glyph_cache.entry(glyph.key).or_insert_with(|| {
            let (_, bitmap) = font.rasterize_config(glyph.key);
            GlyphBitmap {
                width: glyph.width,
                height: glyph.height,
                bitmap,
            }
        });

        blend_glyph(
            frame,
            frame_width,
            frame_height,
            glyph.x.round() as i32,
            glyph.y.round() as i32,
            glyph_bitmap,
            color,
        );
    }
}

fn fill_band(frame: &mut [u8], width: u32, height: u32, top: u32, band_height: u32, color: [u8; 4]) {
    let bottom = top.saturating_add(band_height).min(height);
    for row in top.min(height)..bottom {
        for col in 0..width {
            let idx = ((row * width + col) * 4) as usize;
            blend_pixel(frame, idx, color);
        }
    }
}

fn blend_glyph(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    x: i32,
    y: i32,
    glyph: &GlyphBitmap,
    color: [u8; 4],
) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame_height as i32 {
            continue;
        }

        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame_width as i32 {
                continue;
            }

            let mask = glyph.bitmap[row * glyph.width + col];
            if mask == 0 {
                continue;
            }

            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let idx = ((py as u32 * frame_width + px as u32) * 4) as usize;
            blend_pixel(frame, idx, [color[0], color[1], color[2], alpha]);
        }
    }
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }

    let inv_alpha = 255_u16.saturating_sub(alpha);

    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_punctuation_and_uppercases() {
        assert_eq!(normalize_caption("hello."), "HELLO");
        assert_eq!(normalize_caption("namaste,"), "NAMASTE");
        assert_eq!(normalize_caption("मेष।"), "मेष");
        assert_eq!(normalize_caption("धनु॥"), "धनु");
        assert_eq!(normalize_caption("kya?!"), "KYA");
    }

    #[test]
    fn normalize_keeps_interior_punctuation() {
        assert_eq!(normalize_caption("don't."), "DON'T");
        assert_eq!(normalize_caption("a.b"), "A.B");
    }

    #[test]
    fn normalize_trims_whitespace_first() {
        assert_eq!(normalize_caption("  shanti.  "), "SHANTI");
    }

    #[test]
    fn band_fill_stays_inside_frame() {
        let width = 8u32;
        let height = 8u32;
        let mut frame = vec![0u8; (width * height * 4) as usize];
        // Band extends past the bottom edge; must clamp, not panic.
        fill_band(&mut frame, width, height, 6, 10, [0, 0, 0, 180]);
        // Rows above the band untouched.
        assert!(frame[..(6 * width * 4) as usize].iter().all(|&b| b == 0));
        // Band rows have opaque alpha written back.
        assert_eq!(frame[(6 * width * 4 + 3) as usize], 255);
    }

    #[test]
    fn blend_pixel_full_alpha_replaces_color() {
        let mut frame = vec![10u8, 20, 30, 255];
        blend_pixel(&mut frame, 0, [255, 230, 0, 255]);
        assert_eq!(&frame[..3], &[255, 230, 0]);
    }

    #[test]
    fn blend_pixel_zero_alpha_is_noop() {
        let mut frame = vec![10u8, 20, 30, 255];
        blend_pixel(&mut frame, 0, [255, 255, 255, 0]);
        assert_eq!(&frame[..3], &[10, 20, 30]);
    }
}
