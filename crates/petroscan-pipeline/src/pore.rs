//! Pore segmentation: split touching pores with a distance-seeded
//! watershed, then keep compact regions only.
//!
//! 1. Open the mask to drop speckle.
//! 2. Dilate it to get pixels that are certainly not matrix.
//! 3. Take pixels far from any matrix pixel (beyond a fraction of the
//!    largest such distance) as certain pore cores.
//! 4. Split cores that hold more than one distance peak: each peak that
//!    rises at least `min_peak_prominence` above the saddle joining it to
//!    a higher peak becomes a seed of its own, and the rest of the core
//!    is left for the flood to decide.
//! 5. Label each seed, leave the band between seeds and matrix unknown,
//!    and flood the colour image's gradient from the labels.
//! 6. Measure each flooded region through its largest outer contour and
//!    reject small or non-convex ones.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::contour::find_external;
use crate::geometry::{centroid, contour_area, hull_area};
use crate::kernel::StructuringElement;
use crate::morphology::{dilate, open};
use crate::params::UiHints;
use crate::types::{BinaryMask, Contour, PipelineError, PixelPoint, Point};
use crate::watershed::{self, LabelBounds, Markers, UNKNOWN};

/// Label given to matrix pixels in the marker image.
pub const MATRIX_LABEL: i32 = 1;

/// Seed preparation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatershedParams {
    /// Square kernel size for the speckle-removing opening.
    pub opening_kernel_size: u32,
    /// Opening repetitions.
    pub opening_iterations: u32,
    /// Square kernel size for the sure-background dilation.
    pub sure_bg_kernel_size: u32,
    /// Fraction of the maximum distance above which a pixel is a
    /// certain pore core.
    pub distance_ratio: f64,
    /// Smallest height, in pixels of distance, that a peak must rise
    /// above the saddle joining it to a higher peak to seed its own pore.
    /// 0 keeps every core whole.
    pub min_peak_prominence: f64,
    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl WatershedParams {
    /// Default core distance ratio.
    pub const DEFAULT_DISTANCE_RATIO: f64 = 0.6;
    /// Default peak prominence.
    pub const DEFAULT_MIN_PEAK_PROMINENCE: f64 = 1.0;
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self {
            opening_kernel_size: 3,
            opening_iterations: 2,
            sure_bg_kernel_size: 3,
            distance_ratio: Self::DEFAULT_DISTANCE_RATIO,
            min_peak_prominence: Self::DEFAULT_MIN_PEAK_PROMINENCE,
            ui_hints: UiHints::realtime(),
        }
    }
}

/// Acceptance thresholds for segmented regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoreCriteria {
    /// Smallest contour area, in pixels.
    pub min_area_pixels: f64,
    /// Smallest `area / hull_area`.
    pub min_solidity: f64,
}

impl PoreCriteria {
    /// Default minimum area.
    pub const DEFAULT_MIN_AREA_PIXELS: f64 = 20.0;
    /// Default minimum solidity.
    pub const DEFAULT_MIN_SOLIDITY: f64 = 0.85;
}

impl Default for PoreCriteria {
    fn default() -> Self {
        Self {
            min_area_pixels: Self::DEFAULT_MIN_AREA_PIXELS,
            min_solidity: Self::DEFAULT_MIN_SOLIDITY,
        }
    }
}

/// One accepted pore.
#[derive(Debug, Clone, PartialEq)]
pub struct PoreRegion {
    /// Watershed label (2 or greater).
    pub label: i32,
    /// Largest outer contour of the region.
    pub contour: Contour,
    /// Contour area in pixels.
    pub area: f64,
    /// `area / hull_area`, in `(0, 1]`.
    pub solidity: f64,
    /// Area-weighted centroid.
    pub centroid: Point,
}

impl PoreRegion {
    /// Diameter of the circle with the same area, in pixels.
    #[must_use]
    pub fn equivalent_diameter(&self) -> f64 {
        (4.0 * self.area / std::f64::consts::PI).sqrt()
    }
}

/// Output of [`segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoreSegmentation {
    /// The opened mask (speckle removed).
    pub opened: BinaryMask,
    /// Flooded marker image.
    pub markers: Markers,
    /// Accepted pores in label order.
    pub regions: Vec<PoreRegion>,
}

/// Run the opening step alone; this is what the pore-mode morphology
/// preview shows.
#[must_use = "returns the opened mask"]
pub fn open_speckle(mask: &BinaryMask, params: &WatershedParams) -> BinaryMask {
    open(
        mask,
        &StructuringElement::square(params.opening_kernel_size),
        params.opening_iterations,
    )
}

/// Segment and measure pores in `mask` (pores at 255), flooding over the
/// gradient of `color`.
///
/// A mask that is uniform after opening (all matrix or all pore) yields
/// no regions.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `mask` and `color`
/// differ in size, `distance_ratio` is outside `[0, 1)`, or
/// `min_peak_prominence` is negative or not finite.
pub fn segment(
    mask: &BinaryMask,
    color: &RgbImage,
    params: &WatershedParams,
    criteria: &PoreCriteria,
) -> Result<PoreSegmentation, PipelineError> {
    if color.dimensions() != (mask.width(), mask.height()) {
        return Err(PipelineError::InvalidParameter(
            "mask and colour image sizes differ".to_owned(),
        ));
    }
    if !(0.0..1.0).contains(&params.distance_ratio) {
        return Err(PipelineError::InvalidParameter(format!(
            "distance ratio must be in [0, 1), got {}",
            params.distance_ratio
        )));
    }
    if !(params.min_peak_prominence.is_finite() && params.min_peak_prominence >= 0.0) {
        return Err(PipelineError::InvalidParameter(format!(
            "peak prominence must be a non-negative number, got {}",
            params.min_peak_prominence
        )));
    }

    let opened = open_speckle(mask, params);
    let fg = opened.foreground_count();
    if fg == 0 || fg == opened.width() as usize * opened.height() as usize {
        log::debug!("pore segmentation: uniform mask, nothing to separate");
        return Ok(PoreSegmentation {
            markers: Markers::new(mask.width(), mask.height()),
            opened,
            regions: Vec::new(),
        });
    }
    let sure_bg = dilate(&opened, &StructuringElement::square(params.sure_bg_kernel_size));
    let distance = distance_to_matrix(&opened);
    let sure_fg = sure_foreground(&opened, &distance, params.distance_ratio);
    let (markers, seed_count) = seed_markers(&sure_fg, &sure_bg, &distance, params.min_peak_prominence);
    log::debug!("pore segmentation: {seed_count} seeds");

    let markers = if seed_count == 0 {
        markers
    } else {
        watershed::flood(markers, &watershed::color_gradient(color))?
    };

    let regions: Vec<PoreRegion> = markers
        .label_bounds()
        .into_iter()
        .enumerate()
        .skip(2)
        .filter_map(|(label, bounds)| {
            let label = i32::try_from(label).ok()?;
            measure_region(&markers, label, bounds?, criteria)
        })
        .collect();
    log::debug!("pore segmentation: {} regions accepted", regions.len());

    Ok(PoreSegmentation {
        opened,
        markers,
        regions,
    })
}

// The contour is traced on the label's bounding box only, then shifted
// back to image coordinates.
#[allow(clippy::cast_possible_wrap)]
fn measure_region(
    markers: &Markers,
    label: i32,
    bounds: LabelBounds,
    criteria: &PoreCriteria,
) -> Option<PoreRegion> {
    let (dx, dy) = (bounds.x0 as i32, bounds.y0 as i32);
    let local = find_external(&markers.region_within(label, bounds))
        .into_iter()
        .map(|c| (contour_area(&c), c))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)?;
    let contour = Contour::new(
        local
            .into_points()
            .into_iter()
            .map(|p| PixelPoint::new(p.x + dx, p.y + dy))
            .collect(),
    );

    let area = contour_area(&contour);
    if area < criteria.min_area_pixels {
        log::debug!("pore {label}: area {area} below minimum");
        return None;
    }
    let hull = hull_area(&contour);
    if hull <= 0.0 {
        log::debug!("pore {label}: degenerate hull");
        return None;
    }
    let solidity = area / hull;
    if solidity < criteria.min_solidity {
        log::debug!("pore {label}: solidity {solidity:.3} below minimum");
        return None;
    }

    Some(PoreRegion {
        label,
        centroid: centroid(&contour)?,
        contour,
        area,
        solidity,
    })
}

// Euclidean distance from every pixel to the nearest matrix pixel, row
// major. Matrix pixels are 0.
fn distance_to_matrix(opened: &BinaryMask) -> Vec<f64> {
    // Distance is measured to the nearest non-zero pixel, so the matrix
    // becomes the non-zero side.
    let matrix = GrayImage::from_fn(opened.width(), opened.height(), |x, y| {
        Luma([if opened.is_foreground(x, y) { 0 } else { 255 }])
    });
    imageproc::distance_transform::euclidean_squared_distance_transform(&matrix)
        .pixels()
        .map(|p| p.0[0].sqrt())
        .collect()
}

// Pixels whose distance to the nearest matrix pixel exceeds
// `ratio * max_distance`.
fn sure_foreground(opened: &BinaryMask, distance: &[f64], ratio: f64) -> BinaryMask {
    let w = opened.width() as usize;
    let cutoff = ratio * distance.iter().copied().fold(0.0f64, f64::max);
    BinaryMask::from_fn(opened.width(), opened.height(), |x, y| {
        opened.is_foreground(x, y) && distance[y as usize * w + x as usize] > cutoff
    })
}

// Label the seeds: a core with one distance peak is a seed as a whole; a
// core with several keeps only its peak pixels, one label each, and the
// rest of it becomes unknown. Returns the markers and the seed count.
#[allow(clippy::cast_possible_truncation)]
fn seed_markers(
    sure_fg: &BinaryMask,
    sure_bg: &BinaryMask,
    distance: &[f64],
    prominence: f64,
) -> (Markers, usize) {
    let (w, h) = (sure_fg.width(), sure_fg.height());
    let (cores, core_count) = crate::components::label(sure_fg);
    let core_of = |i: usize| cores.get_pixel((i % w as usize) as u32, (i / w as usize) as u32).0[0] as usize;

    let peaks = if prominence > 0.0 {
        distance_peaks(sure_fg, distance, prominence)
    } else {
        Vec::new()
    };
    let mut peaks_per_core = vec![0usize; core_count as usize + 1];
    for &p in &peaks {
        peaks_per_core[core_of(p)] += 1;
    }

    let mut next = MATRIX_LABEL;
    let mut core_label = vec![UNKNOWN; core_count as usize + 1];
    for (core, label) in core_label.iter_mut().enumerate().skip(1) {
        if peaks_per_core[core] <= 1 {
            next += 1;
            *label = next;
        }
    }

    let mut markers = Markers::new(w, h);
    for (x, y, core) in cores.enumerate_pixels() {
        let core = core.0[0] as usize;
        let label = if core > 0 && core_label[core] != UNKNOWN {
            core_label[core]
        } else if sure_bg.is_foreground(x, y) {
            UNKNOWN
        } else {
            MATRIX_LABEL
        };
        markers.set(x, y, label);
    }
    for &p in peaks.iter().filter(|&&p| peaks_per_core[core_of(p)] > 1) {
        next += 1;
        markers.set((p % w as usize) as u32, (p / w as usize) as u32, next);
    }

    let seeds = usize::try_from(next - MATRIX_LABEL).unwrap_or(0);
    (markers, seeds)
}

// Distance peaks inside `core`, as pixel indices.
//
// Pixels are visited from the highest distance down and joined into
// 8-connected components. Each component's root is its first pixel,
// which is also its peak. When components meet, the one with the lower
// peak is absorbed; it is reported as a peak of its own if it stood at
// least `prominence` above the meeting level. The root that survives in
// each component is always reported.
#[allow(clippy::cast_possible_truncation)]
fn distance_peaks(core: &BinaryMask, distance: &[f64], prominence: f64) -> Vec<usize> {
    const UNSEEN: u32 = u32::MAX;
    let (w, h) = (core.width() as usize, core.height() as usize);

    let mut order: Vec<usize> = (0..w * h)
        .filter(|&i| core.is_foreground((i % w) as u32, (i / w) as u32))
        .collect();
    order.sort_by(|&a, &b| distance[b].total_cmp(&distance[a]));

    let mut parent = vec![UNSEEN; w * h];
    let mut peaks = Vec::new();
    let mut roots = Vec::with_capacity(8);

    for &i in &order {
        let (x, y) = (i % w, i / w);
        roots.clear();
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if n != i && parent[n] != UNSEEN {
                    roots.push(find_root(&mut parent, n));
                }
            }
        }
        roots.sort_unstable();
        roots.dedup();

        let Some(&main) = roots.iter().max_by(|&&a, &&b| distance[a].total_cmp(&distance[b])) else {
            parent[i] = i as u32;
            continue;
        };
        for &r in &roots {
            if r != main {
                if distance[r] - distance[i] >= prominence {
                    peaks.push(r);
                }
                parent[r] = main as u32;
            }
        }
        parent[i] = main as u32;
    }

    peaks.extend(order.iter().copied().filter(|&i| parent[i] as usize == i));
    peaks
}

fn find_root(parent: &mut [u32], mut i: usize) -> usize {
    while parent[i] as usize != i {
        let up = parent[parent[i] as usize];
        parent[i] = up;
        i = up as usize;
    }
    i
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_sign_loss)]
mod tests {
    use super::*;

    fn disks(width: u32, height: u32, centres: &[(f64, f64)], radius: f64) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            centres
                .iter()
                .any(|&(cx, cy)| (f64::from(x) - cx).hypot(f64::from(y) - cy) <= radius)
        })
    }

    fn render(mask: &BinaryMask) -> RgbImage {
        RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.is_foreground(x, y) {
                image::Rgb([40, 40, 40])
            } else {
                image::Rgb([220, 220, 220])
            }
        })
    }

    #[test]
    fn touching_disks_are_split() {
        // Radius 10, centres 15 px apart: the neck is wide enough that the
        // ratio cut alone leaves one core holding both peaks.
        let mask = disks(60, 40, &[(20.0, 20.0), (35.0, 20.0)], 10.0);
        let params = WatershedParams::default();
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 2);
        for r in &seg.regions {
            assert!(r.solidity > 0.85, "solidity {}", r.solidity);
            assert!(r.solidity <= 1.0 + 1e-9);
        }
        let mut xs: Vec<f64> = seg.regions.iter().map(|r| r.centroid.x).collect();
        xs.sort_by(f64::total_cmp);
        assert!(xs[0] < 27.5 && xs[1] > 27.5, "centroids {xs:?}");
    }

    #[test]
    fn separated_cores_split_without_peaks() {
        let mask = disks(60, 40, &[(20.0, 20.0), (38.0, 20.0)], 10.0);
        let params = WatershedParams {
            min_peak_prominence: 0.0,
            ..WatershedParams::default()
        };
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 2);
    }

    #[test]
    fn zero_prominence_keeps_cores_whole() {
        let mask = disks(60, 40, &[(20.0, 20.0), (35.0, 20.0)], 10.0);
        let params = WatershedParams {
            min_peak_prominence: 0.0,
            ..WatershedParams::default()
        };
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 1);
    }

    #[test]
    fn high_prominence_keeps_cores_whole() {
        let mask = disks(60, 40, &[(20.0, 20.0), (35.0, 20.0)], 10.0);
        let params = WatershedParams {
            min_peak_prominence: 5.0,
            ..WatershedParams::default()
        };
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 1);
    }

    #[test]
    fn plateau_ridge_is_one_peak() {
        // A long bar has a flat distance ridge; it must not shatter.
        let bar = BinaryMask::from_fn(80, 20, |x, y| (10..70).contains(&x) && (5..15).contains(&y));
        let distance = distance_to_matrix(&bar);
        let core = sure_foreground(&bar, &distance, 0.6);
        assert_eq!(distance_peaks(&core, &distance, 1.0).len(), 1);
    }

    #[test]
    fn many_pores_keep_image_coordinates() {
        // 20×20 grid of 10 px squares, 20 px apart.
        let mask = BinaryMask::from_fn(400, 400, |x, y| x % 20 >= 5 && x % 20 < 15 && y % 20 >= 5 && y % 20 < 15);
        let params = WatershedParams::default();
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 400);
        for r in &seg.regions {
            let cx = r.centroid.x.rem_euclid(20.0);
            let cy = r.centroid.y.rem_euclid(20.0);
            assert!((cx - 9.5).abs() < 1.0 && (cy - 9.5).abs() < 1.0, "centroid {:?}", r.centroid);
            assert!(r.contour.points().iter().all(|p| mask.is_foreground(p.x as u32, p.y as u32)));
        }
    }

    #[test]
    fn negative_prominence_is_rejected() {
        let mask = BinaryMask::empty(20, 20);
        let params = WatershedParams {
            min_peak_prominence: -1.0,
            ..WatershedParams::default()
        };
        assert!(segment(&mask, &render(&mask), &params, &PoreCriteria::default()).is_err());
    }

    #[test]
    fn single_disk_measured() {
        let mask = disks(40, 40, &[(20.0, 20.0)], 8.0);
        let params = WatershedParams::default();
        let seg = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert_eq!(seg.regions.len(), 1);
        let r = &seg.regions[0];
        assert!((r.centroid.x - 20.0).abs() < 1.0);
        assert!((r.centroid.y - 20.0).abs() < 1.0);
        assert!(r.area > 150.0 && r.area < 250.0, "area {}", r.area);
        assert!((r.equivalent_diameter() - 16.0).abs() < 3.0);
    }

    #[test]
    fn concave_region_fails_solidity() {
        let mask = BinaryMask::from_fn(60, 60, |x, y| {
            let vertical = (10..18).contains(&x) && (10..50).contains(&y);
            let horizontal = (10..50).contains(&x) && (42..50).contains(&y);
            vertical || horizontal
        });
        let params = WatershedParams {
            distance_ratio: 0.2,
            ..WatershedParams::default()
        };
        let strict = segment(&mask, &render(&mask), &params, &PoreCriteria::default()).unwrap();
        assert!(strict.regions.is_empty());

        let lenient = PoreCriteria {
            min_solidity: 0.4,
            ..PoreCriteria::default()
        };
        let loose = segment(&mask, &render(&mask), &params, &lenient).unwrap();
        assert_eq!(loose.regions.len(), 1);
    }

    #[test]
    fn tiny_regions_fail_area() {
        let mask = disks(40, 40, &[(20.0, 20.0)], 8.0);
        let criteria = PoreCriteria {
            min_area_pixels: 1000.0,
            ..PoreCriteria::default()
        };
        let seg = segment(&mask, &render(&mask), &WatershedParams::default(), &criteria).unwrap();
        assert!(seg.regions.is_empty());
    }

    #[test]
    fn uniform_masks_yield_nothing() {
        let empty = BinaryMask::empty(20, 20);
        let seg = segment(&empty, &render(&empty), &WatershedParams::default(), &PoreCriteria::default())
            .unwrap();
        assert!(seg.regions.is_empty());

        let full = BinaryMask::from_fn(20, 20, |_, _| true);
        let seg = segment(&full, &render(&full), &WatershedParams::default(), &PoreCriteria::default())
            .unwrap();
        assert!(seg.regions.is_empty());
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mask = BinaryMask::empty(20, 20);
        let color = RgbImage::new(10, 10);
        assert!(segment(&mask, &color, &WatershedParams::default(), &PoreCriteria::default()).is_err());
    }

    #[test]
    fn ratio_out_of_range_is_rejected() {
        let mask = BinaryMask::empty(20, 20);
        let params = WatershedParams {
            distance_ratio: 1.5,
            ..WatershedParams::default()
        };
        assert!(segment(&mask, &render(&mask), &params, &PoreCriteria::default()).is_err());
    }
}
