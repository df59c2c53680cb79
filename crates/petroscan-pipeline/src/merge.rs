//! Greedy merging of fracture fragments that line up.
//!
//! Fragments are taken in detection order. Each one is compared against
//! the fractures accepted so far; the first accepted fracture with a
//! similar orientation and a nearby endpoint absorbs it (their union's
//! convex hull becomes the new shape). Otherwise it is accepted as is.
//!
//! The pass is single and non-transitive: once two fragments have been
//! merged, the grown result is not compared again against fractures that
//! were accepted earlier, so chains can end up split.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::fracture::Fracture;
use crate::geometry::{angle_difference, convex_hull};
use crate::params::UiHints;
use crate::types::Contour;

/// Merging section of the analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergingParams {
    /// Whether merging runs at all.
    pub enabled: bool,
    /// Largest endpoint gap in millimetres, used when the image has a DPI.
    #[serde(alias = "merge_distance_mm")]
    pub max_distance_mm: f64,
    /// Largest endpoint gap in pixels, used without a DPI.
    pub max_distance_pixels: f64,
    /// Largest orientation difference in degrees.
    pub max_angle_diff: f64,
    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl Default for MergingParams {
    fn default() -> Self {
        Self {
            enabled: false,
            max_distance_mm: 2.0,
            max_distance_pixels: 20.0,
            max_angle_diff: 15.0,
            ui_hints: UiHints::deferred(),
        }
    }
}

/// Resolved merge tolerances, in pixels and degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeTolerance {
    /// Largest endpoint-to-endpoint distance.
    pub max_distance_pixels: f64,
    /// Largest orientation difference.
    pub max_angle_diff: f64,
}

/// Whether `a` and `b` line up closely enough to merge.
#[must_use]
pub fn mergeable(a: &Fracture, b: &Fracture, tolerance: &MergeTolerance) -> bool {
    if angle_difference(a.angle, b.angle) > tolerance.max_angle_diff {
        return false;
    }
    let gap = a
        .endpoints
        .iter()
        .flat_map(|p| b.endpoints.iter().map(move |q| p.to_point().distance(q.to_point())))
        .fold(f64::INFINITY, f64::min);
    gap <= tolerance.max_distance_pixels
}

/// Union of two fractures as their combined convex hull, remeasured.
///
/// Returns `None` if the hull is degenerate.
#[must_use]
pub fn combine(a: &Fracture, b: &Fracture) -> Option<Fracture> {
    let points = a
        .contour
        .points()
        .iter()
        .chain(b.contour.points())
        .copied()
        .collect();
    Fracture::measure_shape(convex_hull(&Contour::new(points)))
}

/// Merge aligned fragments in one greedy pass. The output never has more
/// entries than the input.
#[must_use = "returns the merged fractures"]
pub fn merge_fractures(fractures: Vec<Fracture>, tolerance: &MergeTolerance) -> Vec<Fracture> {
    let before = fractures.len();
    let mut queue: VecDeque<Fracture> = fractures.into();
    let mut accepted: Vec<Fracture> = Vec::with_capacity(before);

    while let Some(current) = queue.pop_front() {
        let target = accepted
            .iter()
            .position(|existing| mergeable(&current, existing, tolerance));
        match target {
            Some(i) => {
                if let Some(merged) = combine(&accepted[i], &current) {
                    accepted[i] = merged;
                } else {
                    log::debug!("merge produced a degenerate hull; keeping both fractures");
                    accepted.push(current);
                }
            }
            None => accepted.push(current),
        }
    }

    log::debug!("fracture merging: {before} -> {}", accepted.len());
    accepted
}
