//! Marker-controlled watershed by priority flooding.
//!
//! Seeds carry positive labels, pixels to be decided carry
//! [`UNKNOWN`]. Flooding starts from every seed's unknown neighbours and
//! always expands the lowest-gradient pixel next (first come, first
//! served on ties). A pixel that touches two different labels when it is
//! reached becomes a [`BOUNDARY`] and stops the flood there.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};

use crate::types::BinaryMask;

/// Label of pixels not yet assigned to any basin.
pub const UNKNOWN: i32 = 0;

/// Label of pixels on the ridge between two basins.
pub const BOUNDARY: i32 = -1;

const QUEUED: i32 = -2;

/// Per-pixel gradient magnitude used as flooding priority.
pub type Gradient = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Inclusive pixel bounding box of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelBounds {
    /// Leftmost column.
    pub x0: u32,
    /// Top row.
    pub y0: u32,
    /// Rightmost column.
    pub x1: u32,
    /// Bottom row.
    pub y1: u32,
}

impl LabelBounds {
    /// Columns covered.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.x1 - self.x0 + 1
    }

    /// Rows covered.
    #[must_use]
    pub const fn height(self) -> u32 {
        self.y1 - self.y0 + 1
    }

    const fn include(self, x: u32, y: u32) -> Self {
        Self {
            x0: if x < self.x0 { x } else { self.x0 },
            y0: if y < self.y0 { y } else { self.y0 },
            x1: if x > self.x1 { x } else { self.x1 },
            y1: if y > self.y1 { y } else { self.y1 },
        }
    }
}

/// A signed label image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    width: u32,
    height: u32,
    labels: Vec<i32>,
}

impl Markers {
    /// All-[`UNKNOWN`] marker image.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![UNKNOWN; width as usize * height as usize],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Label at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.labels[self.index(x, y)]
    }

    /// Set the label at `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, label: i32) {
        let i = self.index(x, y);
        self.labels[i] = label;
    }

    /// Largest label present.
    #[must_use]
    pub fn max_label(&self) -> i32 {
        self.labels.iter().copied().max().unwrap_or(UNKNOWN)
    }

    /// Bounding box of every positive label, indexed by label, in one
    /// pass over the image. Labels that never occur are `None`.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn label_bounds(&self) -> Vec<Option<LabelBounds>> {
        let mut bounds: Vec<Option<LabelBounds>> = vec![None; self.max_label().max(0) as usize + 1];
        let w = self.width as usize;
        for (i, &label) in self.labels.iter().enumerate() {
            if label <= 0 {
                continue;
            }
            let (x, y) = ((i % w) as u32, (i / w) as u32);
            let slot = &mut bounds[label as usize];
            *slot = Some(slot.map_or(LabelBounds { x0: x, y0: y, x1: x, y1: y }, |b| b.include(x, y)));
        }
        bounds
    }

    /// Mask of the pixels carrying `label` inside `bounds`, with the
    /// mask's origin at `(bounds.x0, bounds.y0)`.
    #[must_use]
    pub fn region_within(&self, label: i32, bounds: LabelBounds) -> BinaryMask {
        BinaryMask::from_fn(bounds.width(), bounds.height(), |x, y| {
            self.get(bounds.x0 + x, bounds.y0 + y) == label
        })
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn neighbours(&self, i: usize) -> impl Iterator<Item = usize> {
        let w = self.width as usize;
        let h = self.height as usize;
        let (x, y) = (i % w, i / w);
        [
            (x > 0).then(|| i - 1),
            (x + 1 < w).then(|| i + 1),
            (y > 0).then(|| i - w),
            (y + 1 < h).then(|| i + w),
        ]
        .into_iter()
        .flatten()
    }
}

/// Gradient magnitude of a colour image: the per-channel Sobel magnitude,
/// maximised over R, G and B.
#[must_use = "returns the gradient image"]
pub fn color_gradient(image: &RgbImage) -> Gradient {
    let (w, h) = image.dimensions();
    let channels: [Gradient; 3] = std::array::from_fn(|c| {
        let plane = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]));
        imageproc::gradients::sobel_gradients(&plane)
    });
    Gradient::from_fn(w, h, |x, y| {
        Luma([channels
            .iter()
            .map(|g| g.get_pixel(x, y).0[0])
            .max()
            .unwrap_or(0)])
    })
}

/// Flood `markers` over `gradient`.
///
/// On return every pixel reachable from a seed carries a positive label
/// or [`BOUNDARY`]. Pixels with no path to any seed stay [`UNKNOWN`].
///
/// # Errors
///
/// Returns [`crate::PipelineError::InvalidParameter`] if the gradient and
/// marker dimensions differ.
pub fn flood(markers: Markers, gradient: &Gradient) -> Result<Markers, crate::PipelineError> {
    if gradient.dimensions() != (markers.width, markers.height) {
        return Err(crate::PipelineError::InvalidParameter(format!(
            "gradient is {:?} but markers are {}x{}",
            gradient.dimensions(),
            markers.width,
            markers.height
        )));
    }
    let mut markers = markers;
    let priority = gradient.as_raw();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for i in 0..markers.labels.len() {
        if markers.labels[i] > 0 {
            for n in markers.neighbours(i).collect::<Vec<_>>() {
                if markers.labels[n] == UNKNOWN {
                    markers.labels[n] = QUEUED;
                    heap.push(Reverse((priority[n], seq, n)));
                    seq += 1;
                }
            }
        }
    }

    while let Some(Reverse((_, _, i))) = heap.pop() {
        let mut found = UNKNOWN;
        let mut ridge = false;
        for n in markers.neighbours(i) {
            let l = markers.labels[n];
            if l > 0 {
                if found == UNKNOWN {
                    found = l;
                } else if found != l {
                    ridge = true;
                }
            }
        }

        if ridge || found == UNKNOWN {
            markers.labels[i] = BOUNDARY;
            continue;
        }
        markers.labels[i] = found;

        for n in markers.neighbours(i).collect::<Vec<_>>() {
            if markers.labels[n] == UNKNOWN {
                markers.labels[n] = QUEUED;
                heap.push(Reverse((priority[n], seq, n)));
                seq += 1;
            }
        }
    }

    Ok(markers)
}
