//! Connected-component labelling and area filtering.

use image::{ImageBuffer, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::BinaryMask;

/// Per-pixel component labels; 0 is background, components are `1..=n`.
pub type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label the 8-connected foreground components of `mask`.
#[must_use = "returns the label image and component count"]
pub fn label(mask: &BinaryMask) -> (Labels, u32) {
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0);
    (labels, count)
}

/// Pixel area of each component, indexed by label (index 0 is unused).
#[must_use]
pub fn areas(labels: &Labels, count: u32) -> Vec<usize> {
    let mut areas = vec![0usize; count as usize + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }
    areas[0] = 0;
    areas
}

/// Rebuild `mask` from only the components with at least `min_area` pixels.
///
/// The result is drawn fresh from the qualifying labels; pixels of
/// rejected components never survive.
#[must_use = "returns the filtered mask"]
pub fn remove_small_components(mask: &BinaryMask, min_area: usize) -> BinaryMask {
    if min_area == 0 {
        return mask.clone();
    }
    let (labels, count) = label(mask);
    let areas = areas(&labels, count);
    let kept = areas.iter().skip(1).filter(|&&a| a >= min_area).count();
    log::debug!("area filter: kept {kept} of {count} components (min area {min_area})");

    BinaryMask::from_fn(mask.width(), mask.height(), |x, y| {
        let l = labels.get_pixel(x, y).0[0] as usize;
        l != 0 && areas[l] >= min_area
    })
}
