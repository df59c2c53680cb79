//! Shape measurements on contours: area, convex hull, minimum-area
//! rectangle, flank midpoints, and centroid.
//!
//! Polygon math is delegated to `geo`; contours are converted on the fly.

use geo::{Area, Centroid, ConvexHull, Coord, LineString, MinimumRotatedRect, MultiPoint, Polygon};

use crate::types::{Contour, PixelPoint, Point};

fn coords(contour: &Contour) -> Vec<Coord<f64>> {
    contour
        .points()
        .iter()
        .map(|p| Coord {
            x: f64::from(p.x),
            y: f64::from(p.y),
        })
        .collect()
}

fn polygon(contour: &Contour) -> Polygon<f64> {
    Polygon::new(LineString::new(coords(contour)), Vec::new())
}

fn multi_point(contour: &Contour) -> MultiPoint<f64> {
    MultiPoint::from(
        contour
            .points()
            .iter()
            .map(|p| (f64::from(p.x), f64::from(p.y)))
            .collect::<Vec<_>>(),
    )
}

/// Enclosed area of the ring through the contour's pixel centres
/// (shoelace formula). Thin rings that fold back on themselves have
/// near-zero area.
#[must_use]
pub fn contour_area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    polygon(contour).unsigned_area()
}

/// Convex hull of the contour's points, counter-clockwise, without a
/// repeated closing point.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn convex_hull(contour: &Contour) -> Contour {
    if contour.is_empty() {
        return Contour::new(Vec::new());
    }
    let hull = multi_point(contour).convex_hull();
    Contour::new(
        hull.exterior()
            .coords()
            .map(|c| PixelPoint::new(c.x.round() as i32, c.y.round() as i32))
            .collect(),
    )
}

/// Area of the contour's convex hull.
#[must_use]
pub fn hull_area(contour: &Contour) -> f64 {
    contour_area(&convex_hull(contour))
}

/// A minimum-area bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    /// Corners in ring order.
    pub corners: [Point; 4],
    /// Length of the side from `corners[0]` to `corners[1]`.
    pub width: f64,
    /// Length of the side from `corners[1]` to `corners[2]`.
    pub height: f64,
}

impl RotatedRect {
    /// The longer side length.
    #[must_use]
    pub fn long_side(&self) -> f64 {
        self.width.max(self.height)
    }

    /// The shorter side length.
    #[must_use]
    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// Whether either side has zero length.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.short_side() <= f64::EPSILON
    }

    /// Long side over short side, or `None` for a degenerate rectangle.
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        (!self.is_degenerate()).then(|| self.long_side() / self.short_side())
    }

    /// Orientation of the long side in degrees, in `[0, 180)`, measured
    /// from the +x axis with y pointing down.
    #[must_use]
    pub fn angle(&self) -> f64 {
        let [a, b, c, _] = self.corners;
        let (from, to) = if self.width >= self.height { (a, b) } else { (b, c) };
        normalize_angle((to.y - from.y).atan2(to.x - from.x).to_degrees())
    }

    /// Midpoints of the two long sides.
    #[must_use]
    pub fn long_side_midpoints(&self) -> [Point; 2] {
        let [a, b, c, d] = self.corners;
        let mid = |p: Point, q: Point| Point::new((p.x + q.x) / 2.0, (p.y + q.y) / 2.0);
        if self.width >= self.height {
            [mid(a, b), mid(c, d)]
        } else {
            [mid(b, c), mid(d, a)]
        }
    }
}

/// Fold any angle in degrees into `[0, 180)`.
#[must_use]
pub fn normalize_angle(degrees: f64) -> f64 {
    let folded = degrees.rem_euclid(180.0);
    if 180.0 - folded < 1e-9 { 0.0 } else { folded }
}

/// Smallest difference between two orientations, accounting for the
/// 180° wrap. Always in `[0, 90]`.
#[must_use]
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let diff = (normalize_angle(a) - normalize_angle(b)).abs();
    diff.min(180.0 - diff)
}

/// Minimum-area rectangle enclosing the contour, or `None` when the
/// contour is empty.
#[must_use]
pub fn min_area_rect(contour: &Contour) -> Option<RotatedRect> {
    if contour.is_empty() {
        return None;
    }
    let rect = multi_point(contour).minimum_rotated_rect()?;
    let ring: Vec<Point> = rect
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    let corners: [Point; 4] = match ring.as_slice() {
        [a, b, c, d, ..] => [*a, *b, *c, *d],
        _ => return None,
    };
    Some(RotatedRect {
        corners,
        width: corners[0].distance(corners[1]),
        height: corners[1].distance(corners[2]),
    })
}

/// Representative endpoints of an elongated contour: the midpoints of the
/// long sides of its minimum-area rectangle, each snapped to the nearest
/// point on the contour.
#[must_use]
pub fn contour_endpoints(contour: &Contour) -> Option<[PixelPoint; 2]> {
    let rect = min_area_rect(contour)?;
    let [m1, m2] = rect.long_side_midpoints();
    Some([nearest_point(contour, m1)?, nearest_point(contour, m2)?])
}

fn nearest_point(contour: &Contour, target: Point) -> Option<PixelPoint> {
    contour.points().iter().copied().min_by(|a, b| {
        a.to_point()
            .distance_squared(target)
            .total_cmp(&b.to_point().distance_squared(target))
    })
}

/// Area-weighted centroid of the contour polygon, falling back to the
/// mean of its points when the enclosed area is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid(contour: &Contour) -> Option<Point> {
    if contour.is_empty() {
        return None;
    }
    if contour_area(contour) > 0.0
        && let Some(c) = polygon(contour).centroid()
    {
        return Some(Point::new(c.x(), c.y()));
    }
    let n = contour.len() as f64;
    let (sx, sy) = contour
        .points()
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + f64::from(p.x), sy + f64::from(p.y)));
    Some(Point::new(sx / n, sy / n))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ring(points: &[(i32, i32)]) -> Contour {
        Contour::new(points.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect())
    }

    fn rectangle(w: i32, h: i32) -> Contour {
        ring(&[(0, 0), (w, 0), (w, h), (0, h)])
    }

    #[test]
    fn shoelace_area_of_rectangle() {
        assert!((contour_area(&rectangle(10, 4)) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn area_of_degenerate_contours_is_zero() {
        assert!(contour_area(&ring(&[(0, 0), (5, 0)])).abs() < f64::EPSILON);
        assert!(contour_area(&ring(&[(0, 0), (5, 0), (10, 0)])).abs() < f64::EPSILON);
    }

    #[test]
    fn hull_of_l_shape_fills_notch() {
        let l = ring(&[(0, 0), (10, 0), (10, 2), (2, 2), (2, 10), (0, 10)]);
        assert!((contour_area(&l) - 36.0).abs() < 1e-9);
        assert!((hull_area(&l) - 68.0).abs() < 1e-9);
        assert_eq!(convex_hull(&l).len(), 5);
    }

    #[test]
    fn hull_area_at_least_contour_area() {
        let zigzag = ring(&[(0, 0), (4, 3), (8, 0), (8, 6), (4, 4), (0, 6)]);
        assert!(hull_area(&zigzag) >= contour_area(&zigzag));
    }

    #[test]
    fn axis_aligned_rect_fit() {
        let rect = min_area_rect(&rectangle(20, 4)).unwrap();
        assert!((rect.long_side() - 20.0).abs() < 1e-6);
        assert!((rect.short_side() - 4.0).abs() < 1e-6);
        assert!((rect.aspect_ratio().unwrap() - 5.0).abs() < 1e-6);
        assert!(rect.angle().abs() < 1e-6 || (rect.angle() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn vertical_rect_angle_is_ninety() {
        let rect = min_area_rect(&rectangle(3, 30)).unwrap();
        assert!((rect.angle() - 90.0).abs() < 1e-6, "angle {}", rect.angle());
    }

    #[test]
    fn diagonal_rect_angle() {
        let diag = ring(&[(0, 0), (20, 20), (18, 22), (-2, 2)]);
        let rect = min_area_rect(&diag).unwrap();
        assert!((rect.angle() - 45.0).abs() < 1e-6, "angle {}", rect.angle());
    }

    #[test]
    fn collinear_points_give_degenerate_rect() {
        let line = ring(&[(0, 0), (5, 0), (10, 0), (5, 0)]);
        let rect = min_area_rect(&line);
        assert!(rect.is_none_or(|r| r.is_degenerate()));
    }

    #[test]
    fn angle_wraparound() {
        assert!((angle_difference(5.0, 175.0) - 10.0).abs() < 1e-9);
        assert!((angle_difference(0.0, 90.0) - 90.0).abs() < 1e-9);
        assert!((angle_difference(-10.0, 10.0) - 20.0).abs() < 1e-9);
        assert!(normalize_angle(180.0).abs() < 1e-9);
        assert!((normalize_angle(-45.0) - 135.0).abs() < 1e-9);
    }

    #[test]
    fn endpoints_are_long_side_midpoints_on_contour() {
        let strip = ring(&[(0, 0), (10, 0), (20, 0), (20, 4), (10, 4), (0, 4)]);
        let mut ends = contour_endpoints(&strip).unwrap();
        ends.sort_by_key(|p| p.y);
        assert_eq!(ends, [PixelPoint::new(10, 0), PixelPoint::new(10, 4)]);
    }

    #[test]
    fn centroid_of_square() {
        let c = centroid(&rectangle(10, 10)).unwrap();
        assert!((c.x - 5.0).abs() < 1e-9);
        assert!((c.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_of_line_falls_back_to_mean() {
        let c = centroid(&ring(&[(0, 2), (4, 2), (8, 2)])).unwrap();
        assert!((c.x - 4.0).abs() < 1e-9);
        assert!((c.y - 2.0).abs() < 1e-9);
        assert!(centroid(&Contour::new(Vec::new())).is_none());
    }
}
