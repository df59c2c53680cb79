//! Contour extraction from binary masks, and the reverse: rasterizing a
//! contour back into a filled region.
//!
//! Extraction wraps [`imageproc::contours::find_contours`] (Suzuki-Abe
//! border following) and keeps only outermost borders, so holes and
//! islands inside holes never produce features of their own.

use image::{GrayImage, Luma};
use imageproc::contours::BorderType;

use crate::types::{BinaryMask, Contour, PixelPoint};

/// Outer borders of every top-level foreground region in `mask`.
#[must_use = "returns the external contours"]
pub fn find_external(mask: &BinaryMask) -> Vec<Contour> {
    imageproc::contours::find_contours::<i32>(mask.as_gray())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            Contour::new(
                c.points
                    .into_iter()
                    .map(|p| PixelPoint::new(p.x, p.y))
                    .collect(),
            )
        })
        .collect()
}

/// A contour rasterized into a local mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledContour {
    /// Image position of the mask's top-left pixel.
    pub origin: PixelPoint,
    /// Ring plus interior at 255, covering the contour's bounding box.
    pub mask: BinaryMask,
}

impl FilledContour {
    /// Image coordinates of every filled pixel.
    #[allow(clippy::cast_possible_wrap)]
    pub fn pixels(&self) -> impl Iterator<Item = PixelPoint> + '_ {
        let (w, h) = (self.mask.width(), self.mask.height());
        (0..h)
            .flat_map(move |y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| self.mask.is_foreground(x, y))
            .map(|(x, y)| PixelPoint::new(self.origin.x + x as i32, self.origin.y + y as i32))
    }
}

/// Rasterize `contour` as a filled region, including the ring itself.
///
/// Consecutive points are joined with line segments, then everything the
/// outside cannot reach through 4-connected steps is filled. Any holes
/// the ring encloses are filled too.
#[must_use = "returns the filled region"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fill(contour: &Contour) -> FilledContour {
    let points = contour.points();
    let Some(first) = points.first() else {
        return FilledContour {
            origin: PixelPoint::new(0, 0),
            mask: BinaryMask::empty(0, 0),
        };
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let width = (max_x - min_x + 1) as u32;
    let height = (max_y - min_y + 1) as u32;

    // One pixel of padding on every side keeps the outside connected.
    let mut canvas = GrayImage::new(width + 2, height + 2);
    let local = |p: &PixelPoint| ((p.x - min_x + 1) as f32, (p.y - min_y + 1) as f32);
    for (i, p) in points.iter().enumerate() {
        let next = &points[(i + 1) % points.len()];
        imageproc::drawing::draw_line_segment_mut(&mut canvas, local(p), local(next), Luma([255]));
        let (x, y) = local(p);
        canvas.put_pixel(x as u32, y as u32, Luma([255]));
    }

    let outside = flood_outside(&canvas);
    let mask = BinaryMask::from_fn(width, height, |x, y| {
        !outside[((y + 1) * (width + 2) + x + 1) as usize]
    });

    FilledContour {
        origin: PixelPoint::new(min_x, min_y),
        mask,
    }
}

// 4-connected flood of zero pixels from the canvas corner.
fn flood_outside(canvas: &GrayImage) -> Vec<bool> {
    let (w, h) = canvas.dimensions();
    let mut seen = vec![false; w as usize * h as usize];
    let mut stack = vec![(0u32, 0u32)];
    seen[0] = true;
    while let Some((x, y)) = stack.pop() {
        let neighbours = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbours {
            if nx >= w || ny >= h {
                continue;
            }
            let idx = (ny * w + nx) as usize;
            if !seen[idx] && canvas.get_pixel(nx, ny).0[0] == 0 {
                seen[idx] = true;
                stack.push((nx, ny));
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(i32, i32)]) -> Contour {
        Contour::new(points.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect())
    }

    #[test]
    fn single_square_has_one_contour() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| (5..15).contains(&x) && (5..15).contains(&y));
        let contours = find_external(&mask);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].points().contains(&PixelPoint::new(5, 5)));
        assert!(contours[0].points().contains(&PixelPoint::new(14, 14)));
    }

    #[test]
    fn holes_are_not_reported() {
        let mask = BinaryMask::from_fn(30, 30, |x, y| {
            let outer = (5..25).contains(&x) && (5..25).contains(&y);
            let hole = (10..20).contains(&x) && (10..20).contains(&y);
            outer && !hole
        });
        assert_eq!(find_external(&mask).len(), 1);
    }

    #[test]
    fn islands_inside_holes_are_skipped() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| {
            let outer = (5..35).contains(&x) && (5..35).contains(&y);
            let hole = (10..30).contains(&x) && (10..30).contains(&y);
            let island = (15..25).contains(&x) && (15..25).contains(&y);
            (outer && !hole) || island
        });
        assert_eq!(find_external(&mask).len(), 1);
    }

    #[test]
    fn separate_regions_each_get_a_contour() {
        let mask = BinaryMask::from_fn(30, 10, |x, y| (2..6).contains(&y) && (x < 8 || x > 20));
        assert_eq!(find_external(&mask).len(), 2);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(find_external(&BinaryMask::empty(8, 8)).is_empty());
    }

    #[test]
    fn fill_square_outline() {
        let filled = fill(&ring(&[(2, 3), (6, 3), (6, 7), (2, 7)]));
        assert_eq!(filled.origin, PixelPoint::new(2, 3));
        assert_eq!(filled.mask.foreground_count(), 25);
        assert!(filled.pixels().any(|p| p == PixelPoint::new(4, 5)));
    }

    #[test]
    fn fill_recovers_traced_region() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| {
            let dx = f64::from(x) - 20.0;
            let dy = f64::from(y) - 20.0;
            dx.hypot(dy) <= 8.0
        });
        let contour = find_external(&mask).remove(0);
        let filled = fill(&contour);
        assert_eq!(filled.mask.foreground_count(), mask.foreground_count());
        assert!(filled.pixels().all(|p| mask.is_foreground(p.x as u32, p.y as u32)));
    }

    #[test]
    fn fill_thin_line() {
        let line: Vec<(i32, i32)> = (0..10).map(|x| (x, 0)).chain((1..9).rev().map(|x| (x, 0))).collect();
        let filled = fill(&ring(&line));
        assert_eq!(filled.mask.foreground_count(), 10);
    }

    #[test]
    fn fill_empty_contour() {
        let filled = fill(&Contour::new(Vec::new()));
        assert_eq!(filled.mask.foreground_count(), 0);
    }
}
