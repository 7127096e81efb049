use std::io::Cursor;

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::config::{EngineConfig, Layout};
use crate::content::{ExtractOptions, TextRun, extract_page_runs};
use crate::detect::{DetectionMode, open_template};
use crate::error::EngineError;
use crate::overlay::fill_interactive;
use crate::pages::collect_pages;
use crate::scan::ScanResult;

const MAX_SIDE: f64 = 8192.0;
const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);
const VALUE_INK: Rgba<u8> = Rgba([20, 60, 160, 255]);
const MARK_INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Approximate raster of one page with the session's current values.
///
/// Text is drawn with an 8x8 bitmap font stretched over each run, so the
/// result shows placement, not typography.
pub fn render_page(
    template: &[u8],
    mode: &DetectionMode,
    config: &EngineConfig,
    page_index: usize,
    scale: f64,
) -> Result<RgbaImage, EngineError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(EngineError::Preview(format!("invalid scale {scale}")));
    }
    let mut doc = open_template(template)?;
    if let DetectionMode::Interactive(fields) = mode {
        let layout = Layout {
            flatten: true,
            ..config.layout
        };
        fill_interactive(&mut doc, fields, &layout)?;
    }
    let pages = collect_pages(&doc);
    let page = pages.get(page_index).ok_or_else(|| {
        EngineError::Preview(format!("page {} out of range 1..={}", page_index + 1, pages.len()))
    })?;

    let (width, height) = (page.width() * scale, page.height() * scale);
    if width < 1.0 || height < 1.0 || width > MAX_SIDE || height > MAX_SIDE {
        return Err(EngineError::Preview(format!(
            "raster size {width:.0}x{height:.0} out of bounds"
        )));
    }
    let mut img = RgbaImage::from_pixel(width.ceil() as u32, height.ceil() as u32, PAPER);
    let runs = extract_page_runs(
        &doc,
        page,
        page_index,
        ExtractOptions {
            include_annotations: true,
        },
    );
    let canvas = Canvas {
        scale,
        page_height: page.height(),
    };
    for run in &runs {
        canvas.draw_run(&mut img, run, INK);
    }
    if let DetectionMode::Inert(result) = mode {
        canvas.draw_inert(&mut img, result, page_index + 1, &config.layout);
    }
    debug!(page = page_index + 1, runs = runs.len(), "preview rendered");
    Ok(img)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, EngineError> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|err| EngineError::Preview(err.to_string()))?;
    Ok(out)
}

struct Canvas {
    scale: f64,
    page_height: f64,
}

impl Canvas {
    /// Top-left pixel of a glyph box whose baseline sits at top-down `y`.
    fn glyph_origin(&self, x: f64, y: f64, font_size: f64) -> (i32, i32) {
        (
            (x * self.scale).round() as i32,
            ((y - font_size * 0.8) * self.scale).round() as i32,
        )
    }

    fn draw_run(&self, img: &mut RgbaImage, run: &TextRun, color: Rgba<u8>) {
        let baseline = self.page_height - run.y;
        let advance = if run.char_count > 0 {
            run.width / run.char_count as f64
        } else {
            0.0
        };
        self.draw_text(img, &run.text, run.x, baseline, run.font_size, advance, color);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &self,
        img: &mut RgbaImage,
        text: &str,
        x: f64,
        baseline: f64,
        font_size: f64,
        advance: f64,
        color: Rgba<u8>,
    ) {
        let cell = (font_size * self.scale / 8.0).round().max(1.0) as u32;
        for (i, ch) in text.chars().enumerate() {
            let (px, py) = self.glyph_origin(x + advance * i as f64, baseline, font_size);
            draw_bitmap_glyph(img, px, py, ch, color, cell);
        }
    }

    fn draw_inert(&self, img: &mut RgbaImage, result: &ScanResult, page: usize, layout: &Layout) {
        for field in result.fields.iter().filter(|f| f.page == page) {
            let value = field.current_value.trim();
            if value.is_empty() {
                continue;
            }
            let size = if field.font_size_hint > 0.0 {
                field.font_size_hint
            } else {
                layout.font_size
            };
            if layout.mask_tokens {
                let (x0, y0) = self.glyph_origin(field.x, field.y, size);
                let x1 = ((field.x + field.token_width) * self.scale).round() as i32;
                let y1 = ((field.y + size * 0.25) * self.scale).round() as i32;
                fill_rect(img, x0, y0, x1, y1, PAPER);
            }
            let chars = value.chars().count().max(1) as f64;
            let advance = (size * 0.55).min(field.width_hint / chars);
            self.draw_text(
                img,
                value,
                field.x,
                field.y - layout.baseline_nudge,
                size,
                advance,
                VALUE_INK,
            );
        }
        for mark in result.radios.iter().filter(|o| o.page == page && o.selected) {
            let size = if mark.font_size_hint > 0.0 {
                mark.font_size_hint
            } else {
                layout.font_size
            };
            draw_disc(
                img,
                mark.x * self.scale,
                mark.y * self.scale,
                size * layout.mark_scale * self.scale,
                MARK_INK,
            );
        }
    }
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix =
        |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        (f64::from(dst[3]) + f64::from(src[3]) * inv).round().clamp(0.0, 255.0) as u8,
    ])
}

fn put_blended(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i32 && y < img.height() as i32 {
        let dst = *img.get_pixel(x as u32, y as u32);
        img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
    }
}

fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    if radius <= 0.1 {
        put_blended(img, cx.round() as i32, cy.round() as i32, color);
        return;
    }
    let min_x = clamp_i32((cx - radius).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32((cx + radius).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32((cy - radius).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32((cy + radius).ceil() as i32, 0, img.height() as i32 - 1);
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy <= r2 {
                put_blended(img, x, y, color);
            }
        }
    }
}

fn draw_bitmap_glyph(img: &mut RgbaImage, x: i32, y: i32, ch: char, color: Rgba<u8>, cell: u32) {
    if ch.is_whitespace() {
        return;
    }
    let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
        return;
    };
    let cell = cell.max(1) as i32;
    for (row_idx, row) in glyph.iter().enumerate() {
        for col_idx in 0..8 {
            if (*row >> col_idx) & 1 == 0 {
                continue;
            }
            let px = x + col_idx * cell;
            let py = y + row_idx as i32 * cell;
            for sy in 0..cell {
                for sx in 0..cell {
                    put_blended(img, px + sx, py + sy, color);
                }
            }
        }
    }
}

fn fill_rect(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, img.width() as i32 - 1);
    let max_x = clamp_i32(x0.max(x1), 0, img.width() as i32 - 1);
    let min_y = clamp_i32(y0.min(y1), 0, img.height() as i32 - 1);
    let max_y = clamp_i32(y0.max(y1), 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            put_blended(img, x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_source_replaces_destination() {
        let out = blend_pixel(Rgba([255, 255, 255, 255]), Rgba([10, 20, 30, 255]));
        assert_eq!(out, Rgba([10, 20, 30, 255]));
        let half = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(half[0], 128);
    }

    #[test]
    fn disc_stays_inside_the_image() {
        let mut img = RgbaImage::from_pixel(10, 10, PAPER);
        draw_disc(&mut img, 0.0, 0.0, 4.0, MARK_INK);
        assert_eq!(*img.get_pixel(0, 0), MARK_INK);
        assert_eq!(*img.get_pixel(9, 9), PAPER);
    }

    #[test]
    fn glyphs_leave_ink() {
        let mut img = RgbaImage::from_pixel(16, 16, PAPER);
        draw_bitmap_glyph(&mut img, 0, 0, 'A', INK, 2);
        assert!(img.pixels().any(|p| *p == INK));
        let mut blank = RgbaImage::from_pixel(16, 16, PAPER);
        draw_bitmap_glyph(&mut blank, 0, 0, ' ', INK, 2);
        assert!(blank.pixels().all(|p| *p == PAPER));
    }

    #[test]
    fn png_encoding_has_signature() {
        let img = RgbaImage::from_pixel(4, 4, PAPER);
        let png = encode_png(&img).expect("png");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
