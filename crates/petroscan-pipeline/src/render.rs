//! Visualization overlays drawn on a copy of the source image.
//!
//! Fractures are outlined in a single colour. Pores are filled, each with
//! the next colour of [`PORE_COLORS`], so neighbouring pores split by the
//! watershed stay distinguishable.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::contour::fill;
use crate::fracture::Fracture;
use crate::pore::PoreRegion;
use crate::types::Contour;

/// Fracture outline colour.
pub const FRACTURE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Pore fill colours, cycled in detection order.
pub const PORE_COLORS: &[Rgb<u8>] = &[
    Rgb([230, 25, 75]),   // red
    Rgb([60, 180, 75]),   // green
    Rgb([255, 225, 25]),  // yellow
    Rgb([0, 130, 200]),   // blue
    Rgb([245, 130, 48]),  // orange
    Rgb([145, 30, 180]),  // purple
    Rgb([70, 240, 240]),  // cyan
    Rgb([240, 50, 230]),  // magenta
];

/// Outline every fracture on a copy of `base`.
#[must_use = "returns the annotated image"]
pub fn draw_fractures(base: &RgbImage, fractures: &[Fracture]) -> RgbImage {
    let mut canvas = base.clone();
    for fracture in fractures {
        draw_outline(&mut canvas, &fracture.contour, FRACTURE_COLOR);
    }
    canvas
}

/// Fill and outline every pore on a copy of `base`.
#[must_use = "returns the annotated image"]
pub fn draw_pores(base: &RgbImage, pores: &[PoreRegion]) -> RgbImage {
    let mut canvas = base.clone();
    for (i, pore) in pores.iter().enumerate() {
        let color = pore_color(i);
        fill_region(&mut canvas, &pore.contour, color);
        draw_outline(&mut canvas, &pore.contour, color);
    }
    canvas
}

/// Colour of the `index`-th pore.
#[must_use]
pub fn pore_color(index: usize) -> Rgb<u8> {
    PORE_COLORS[index % PORE_COLORS.len()]
}

// Two pixels wide: the ring plus a copy shifted one pixel right and down.
#[allow(clippy::cast_precision_loss)]
fn draw_outline(canvas: &mut RgbImage, contour: &Contour, color: Rgb<u8>) {
    let points = contour.points();
    if points.is_empty() {
        return;
    }
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        for offset in [0.0, 1.0] {
            draw_line_segment_mut(
                canvas,
                (p.x as f32 + offset, p.y as f32 + offset),
                (q.x as f32 + offset, q.y as f32 + offset),
                color,
            );
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn fill_region(canvas: &mut RgbImage, contour: &Contour, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    for p in fill(contour).pixels() {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h {
            canvas.put_pixel(p.x as u32, p.y as u32, color);
        }
    }
}
