// placeholder.rs: equirectangular grid shown when there is no media to draw

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

const SKY: Rgba<u8> = Rgba([0x88, 0x88, 0x88, 0xFF]);
const GROUND: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xFF]);
const LINE: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);
const CAPTION: [u8; 3] = [0xFF, 0x00, 0x00];

/// Grid with a line every `360/columns` and `180/rows` degrees; every third
/// line is heavier. Gray sky over black ground. The caption, if any, is
/// centred slightly below the horizon.
pub fn render_grid(
    width: u32,
    height: u32,
    rows: usize,
    columns: usize,
    message: Option<&str>,
    font: Option<&FontArc>,
) -> RgbaImage {
    let mut canvas = RgbaImage::from_fn(width, height, |_, y| {
        if y < height / 2 {
            SKY
        } else {
            GROUND
        }
    });

    // widths tuned for a 4k canvas
    let major = (width / 256).max(1);
    let minor = (width / 1024).max(1);

    for i in 0..columns.max(1) {
        let x = (width as u64 * i as u64 / columns.max(1) as u64) as u32;
        let stroke = if i % 3 == 0 { major } else { minor };
        vertical_line(&mut canvas, x, stroke);
    }
    for i in 0..rows.max(1) {
        let y = (height as u64 * i as u64 / rows.max(1) as u64) as u32;
        let stroke = if i % 3 == 0 { major } else { minor };
        horizontal_line(&mut canvas, y, stroke);
    }

    if let (Some(text), Some(font)) = (message, font) {
        let size = (height / 64).max(8) as f32;
        draw_caption(&mut canvas, font, text, size, 9 * height / 16);
    }

    canvas
}

fn vertical_line(canvas: &mut RgbaImage, x: u32, stroke: u32) {
    let (width, height) = canvas.dimensions();
    let start = x.saturating_sub(stroke / 2);
    let end = (start + stroke).min(width);
    for px in start..end {
        for py in 0..height {
            canvas.put_pixel(px, py, LINE);
        }
    }
}

fn horizontal_line(canvas: &mut RgbaImage, y: u32, stroke: u32) {
    let (width, height) = canvas.dimensions();
    let start = y.saturating_sub(stroke / 2);
    let end = (start + stroke).min(height);
    for py in start..end {
        for px in 0..width {
            canvas.put_pixel(px, py, LINE);
        }
    }
}

/// Horizontal extent of `text` at `size` px.
pub fn measure(font: &FontArc, text: &str, size: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(size));
    let mut width = 0.0;
    let mut previous = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        previous = Some(id);
    }
    width
}

fn draw_caption(canvas: &mut RgbaImage, font: &FontArc, text: &str, size: f32, baseline: u32) {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let (width, height) = canvas.dimensions();

    let mut caret = width as f32 / 2.0 - measure(font, text, size) / 2.0;
    let mut previous = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, baseline as f32));
        caret += scaled.h_advance(id);
        previous = Some(id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let x = bounds.min.x as i64 + gx as i64;
            let y = bounds.min.y as i64 + gy as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                return;
            }
            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
            let a = coverage.clamp(0.0, 1.0);
            for (channel, target) in pixel.0.iter_mut().take(3).zip(CAPTION) {
                *channel = (*channel as f32 * (1.0 - a) + target as f32 * a).round() as u8;
            }
        });
    }
}
