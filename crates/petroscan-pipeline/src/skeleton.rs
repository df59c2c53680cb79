//! Zhang-Suen thinning.
//!
//! Reduces each foreground region to a one-pixel-wide centreline. The
//! number of centreline pixels is the length measure used for fractures.

use crate::types::BinaryMask;

/// Thin `mask` to its skeleton.
#[must_use = "returns the skeleton"]
pub fn skeletonize(mask: &BinaryMask) -> BinaryMask {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let mut grid: Vec<bool> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| mask.is_foreground(x as u32, y as u32))
        .collect();

    let mut doomed = Vec::new();
    loop {
        let mut changed = false;
        for pass in [Pass::First, Pass::Second] {
            doomed.clear();
            for y in 0..h {
                for x in 0..w {
                    if grid[y * w + x] && removable(&grid, w, h, x, y, pass) {
                        doomed.push(y * w + x);
                    }
                }
            }
            changed |= !doomed.is_empty();
            for &i in &doomed {
                grid[i] = false;
            }
        }
        if !changed {
            break;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    BinaryMask::from_fn(w as u32, h as u32, |x, y| grid[y as usize * w + x as usize])
}

/// Skeleton pixel count of `mask`.
#[must_use]
pub fn skeleton_length(mask: &BinaryMask) -> usize {
    skeletonize(mask).foreground_count()
}

#[derive(Clone, Copy)]
enum Pass {
    First,
    Second,
}

// Neighbours clockwise from north: P2..P9.
const RING: [(isize, isize); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn removable(grid: &[bool], w: usize, h: usize, x: usize, y: usize, pass: Pass) -> bool {
    let at = |(dx, dy): (isize, isize)| {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        nx >= 0
            && ny >= 0
            && (nx as usize) < w
            && (ny as usize) < h
            && grid[ny as usize * w + nx as usize]
    };
    let p: [bool; 8] = RING.map(at);

    let neighbours = p.iter().filter(|&&v| v).count();
    if !(2..=6).contains(&neighbours) {
        return false;
    }
    let transitions = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
    if transitions != 1 {
        return false;
    }

    let [n, _, e, _, s, _, w_, _] = p;
    match pass {
        Pass::First => !(n && e && s) && !(e && s && w_),
        Pass::Second => !(n && e && w_) && !(n && s && w_),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thick_bar_thins_to_its_length() {
        // 54×5 bar: a 50 px line dilated by a 5×5 square.
        let bar = BinaryMask::from_fn(70, 20, |x, y| (8..62).contains(&x) && (8..13).contains(&y));
        let skeleton = skeletonize(&bar);
        let length = skeleton.foreground_count();
        assert!((48..=52).contains(&length), "length {length}");
        for x in 15..55 {
            let column: usize = (0..20).filter(|&y| skeleton.is_foreground(x, y)).count();
            assert_eq!(column, 1, "column {x} should be one pixel thick");
        }
    }

    #[test]
    fn one_pixel_line_is_preserved() {
        let line = BinaryMask::from_fn(30, 5, |x, y| y == 2 && (5..25).contains(&x));
        assert_eq!(skeletonize(&line), line);
    }

    #[test]
    fn skeleton_is_subset_of_input() {
        let blob = BinaryMask::from_fn(40, 40, |x, y| {
            let dx = f64::from(x) - 20.0;
            let dy = f64::from(y) - 20.0;
            dx.hypot(dy) < 12.0 || ((5..35).contains(&x) && (18..22).contains(&y))
        });
        let skeleton = skeletonize(&blob);
        assert!(skeleton.foreground_count() > 0);
        for y in 0..40 {
            for x in 0..40 {
                if skeleton.is_foreground(x, y) {
                    assert!(blob.is_foreground(x, y));
                }
            }
        }
    }

    #[test]
    fn thinning_is_idempotent() {
        let bar = BinaryMask::from_fn(40, 12, |x, y| (4..36).contains(&x) && (3..9).contains(&y));
        let once = skeletonize(&bar);
        assert_eq!(skeletonize(&once), once);
    }

    #[test]
    fn empty_mask_has_zero_length() {
        assert_eq!(skeleton_length(&BinaryMask::empty(10, 10)), 0);
    }
}
