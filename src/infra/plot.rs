// ============================================================
// Layer 6 — Confusion Matrix Plot
// ============================================================
// Renders a confusion matrix as a PNG heatmap with the image
// crate. Rows are true classes, columns are predictions, both
// in label-table order. Cell shade scales with the count
// (white → dark blue) and each cell carries its count, drawn
// with a built-in 3×5 pixel digit font.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

use crate::domain::report::ConfusionMatrix;

const CELL:   u32 = 64;
const MARGIN: u32 = 16;
const SCALE:  u32 = 4;

const LIGHT: [f32; 3] = [247.0, 251.0, 255.0];
const DARK:  [f32; 3] = [8.0, 48.0, 107.0];

// 3×5 glyphs for 0-9, one row per u8 (low 3 bits, MSB = left)
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Render `cm` into an in-memory image.
pub fn render_confusion_matrix(cm: &ConfusionMatrix) -> RgbImage {
    let n    = cm.num_classes() as u32;
    let side = 2 * MARGIN + n.max(1) * CELL;
    let mut img = RgbImage::from_pixel(side, side, Rgb([255, 255, 255]));

    let max = cm.max_count().max(1) as f32;

    for (t, row) in cm.rows().iter().enumerate() {
        for (p, &count) in row.iter().enumerate() {
            let x0 = MARGIN + p as u32 * CELL;
            let y0 = MARGIN + t as u32 * CELL;
            let shade = count as f32 / max;
            fill_rect(&mut img, x0, y0, CELL, CELL, lerp(shade));

            let ink = if shade > 0.5 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
            draw_number(&mut img, count, x0 + CELL / 2, y0 + CELL / 2, ink);
        }
    }
    img
}

/// Render and write a PNG.
pub fn save_confusion_matrix(cm: &ConfusionMatrix, path: &Path) -> Result<()> {
    render_confusion_matrix(cm)
        .save(path)
        .with_context(|| format!("Cannot write confusion matrix to '{}'", path.display()))?;
    tracing::info!("Confusion matrix saved at: {}", path.display());
    Ok(())
}

fn lerp(t: f32) -> Rgb<u8> {
    let mix = |i: usize| (LIGHT[i] + (DARK[i] - LIGHT[i]) * t).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, color);
        }
    }
}

/// Draw `value` centred on (cx, cy).
fn draw_number(img: &mut RgbImage, value: usize, cx: u32, cy: u32, color: Rgb<u8>) {
    let text    = value.to_string();
    let glyph_w = 3 * SCALE;
    let advance = glyph_w + SCALE;
    let width   = text.len() as u32 * advance - SCALE;
    let x_start = cx.saturating_sub(width / 2);
    let y_start = cy.saturating_sub(5 * SCALE / 2);

    for (i, ch) in text.bytes().enumerate() {
        let glyph = DIGITS[(ch - b'0') as usize];
        let gx = x_start + i as u32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(img, gx + col * SCALE, y_start + row as u32 * SCALE, SCALE, SCALE, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_follows_class_count() {
        let cm  = ConfusionMatrix::from_predictions(&[0, 1, 2, 3], &[0, 1, 2, 3], 4);
        let img = render_confusion_matrix(&cm);
        assert_eq!(img.width(), 2 * MARGIN + 4 * CELL);
        assert_eq!(img.height(), img.width());
    }

    #[test]
    fn test_max_cell_is_darkest() {
        let cm  = ConfusionMatrix::from_predictions(&[0, 0, 0, 1], &[0, 0, 0, 0], 2);
        let img = render_confusion_matrix(&cm);
        // top-left corner pixels of each cell are never covered by digits
        assert_eq!(*img.get_pixel(MARGIN + 1, MARGIN + 1), lerp(1.0));
        assert_eq!(*img.get_pixel(MARGIN + CELL + 1, MARGIN + CELL + 1), lerp(0.0));
    }

    #[test]
    fn test_saves_png() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("confusion_matrix_Test_Data.png");
        let cm   = ConfusionMatrix::from_predictions(&[0, 1], &[1, 1], 2);
        save_confusion_matrix(&cm, &path).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 2 * MARGIN + 2 * CELL);
    }
}
