//! Structuring elements for binary morphology.

use serde::{Deserialize, Serialize};

/// Shape of a structuring element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelShape {
    /// Every tap set.
    #[default]
    Rect,
    /// Centre row and centre column.
    Cross,
    /// Filled ellipse inscribed in the bounding box.
    Ellipse,
}

/// A boolean kernel anchored at its centre (`width / 2`, `height / 2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    taps: Vec<bool>,
}

impl StructuringElement {
    /// Build a kernel of the given shape and size.
    ///
    /// A zero dimension yields an empty kernel, which morphology treats as
    /// a no-op.
    #[must_use]
    pub fn new(shape: KernelShape, width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self {
                width,
                height,
                taps: Vec::new(),
            };
        }
        let (cx, cy) = (width / 2, height / 2);
        let mut taps = vec![false; width as usize * height as usize];

        for y in 0..height {
            let row = match shape {
                KernelShape::Rect => 0..width,
                KernelShape::Cross => {
                    if y == cy {
                        0..width
                    } else {
                        cx..cx + 1
                    }
                }
                KernelShape::Ellipse => ellipse_row(width, height, y),
            };
            for x in row {
                taps[(y * width + x) as usize] = true;
            }
        }

        Self {
            width,
            height,
            taps,
        }
    }

    /// Square rectangular kernel.
    #[must_use]
    pub fn square(size: u32) -> Self {
        Self::new(KernelShape::Rect, size, size)
    }

    /// Kernel width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Kernel height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether the kernel has no taps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.taps.iter().any(|&t| t)
    }

    /// Offsets of set taps relative to the anchor.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        let (cx, cy) = ((self.width / 2) as i32, (self.height / 2) as i32);
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.taps[(y * self.width + x) as usize])
            .map(|(x, y)| (x as i32 - cx, y as i32 - cy))
            .collect()
    }
}

// Column span of row `y` in an ellipse filling a `width × height` box.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn ellipse_row(width: u32, height: u32, y: u32) -> std::ops::Range<u32> {
    let r = f64::from(height / 2);
    let c = f64::from(width / 2);
    let dy = f64::from(y) - r;
    if dy.abs() > r {
        return 0..0;
    }
    let dx = if r > 0.0 {
        (c * ((r * r - dy * dy) / (r * r)).sqrt()).round() as i64
    } else {
        c as i64
    };
    let c = c as i64;
    let start = (c - dx).max(0) as u32;
    let end = (c + dx + 1).min(i64::from(width)) as u32;
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(k: &StructuringElement) -> Vec<String> {
        let offsets = k.offsets();
        let (cx, cy) = ((k.width() / 2) as i32, (k.height() / 2) as i32);
        (0..k.height() as i32)
            .map(|y| {
                (0..k.width() as i32)
                    .map(|x| {
                        if offsets.contains(&(x - cx, y - cy)) {
                            '#'
                        } else {
                            '.'
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn rect_is_full() {
        let k = StructuringElement::square(3);
        assert_eq!(k.offsets().len(), 9);
        assert!(k.offsets().contains(&(-1, -1)));
        assert!(k.offsets().contains(&(1, 1)));
    }

    #[test]
    fn cross_shape() {
        let k = StructuringElement::new(KernelShape::Cross, 5, 5);
        assert_eq!(rows(&k), ["..#..", "..#..", "#####", "..#..", "..#.."]);
    }

    #[test]
    fn ellipse_shape() {
        let k = StructuringElement::new(KernelShape::Ellipse, 5, 5);
        assert_eq!(rows(&k), ["..#..", "#####", "#####", "#####", "..#.."]);
    }

    #[test]
    fn three_by_three_ellipse_is_cross() {
        let e = StructuringElement::new(KernelShape::Ellipse, 3, 3);
        let c = StructuringElement::new(KernelShape::Cross, 3, 3);
        assert_eq!(e.offsets(), c.offsets());
    }

    #[test]
    fn even_size_anchor_is_right_of_centre() {
        let k = StructuringElement::square(2);
        let offsets = k.offsets();
        assert_eq!(offsets, [(-1, -1), (0, -1), (-1, 0), (0, 0)]);
    }

    #[test]
    fn zero_size_is_empty() {
        assert!(StructuringElement::square(0).is_empty());
        assert!(StructuringElement::new(KernelShape::Ellipse, 0, 3).is_empty());
    }
}
