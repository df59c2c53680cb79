//! Windowed mean and standard deviation via summed-area tables.
//!
//! Niblack and Sauvola thresholds need the mean and spread of every
//! pixel's neighbourhood. Two integral images (of values and of squared
//! values) answer each window query in constant time. Windows are clipped
//! at the image border, so edge pixels average over fewer samples.

use image::GrayImage;

/// Summed-area tables over a grayscale image.
pub struct LocalStats {
    width: u32,
    height: u32,
    sums: Vec<u64>,
    squares: Vec<u64>,
}

impl LocalStats {
    /// Build the value and squared-value tables for `gray`.
    #[must_use]
    pub fn new(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let stride = w as usize + 1;
        let mut sums = vec![0u64; stride * (h as usize + 1)];
        let mut squares = vec![0u64; stride * (h as usize + 1)];

        for y in 0..h as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w as usize {
                #[allow(clippy::cast_possible_truncation)]
                let v = u64::from(gray.get_pixel(x as u32, y as u32).0[0]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                let above = y * stride + x + 1;
                sums[idx] = row_sum + sums[above];
                squares[idx] = row_sq + squares[above];
            }
        }

        Self {
            width: w,
            height: h,
            sums,
            squares,
        }
    }

    /// Mean and population standard deviation of the `window × window`
    /// neighbourhood centred on `(cx, cy)`, clipped to the image.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_std(&self, cx: u32, cy: u32, window: u32) -> (f64, f64) {
        let radius = window / 2;
        let stride = self.width as usize + 1;
        let x1 = cx.saturating_sub(radius) as usize;
        let y1 = cy.saturating_sub(radius) as usize;
        let x2 = (cx.saturating_add(radius) as usize + 1).min(self.width as usize);
        let y2 = (cy.saturating_add(radius) as usize + 1).min(self.height as usize);

        let count = ((x2 - x1) * (y2 - y1)) as f64;
        if count == 0.0 {
            return (0.0, 0.0);
        }

        let window_sum = |table: &[u64]| -> f64 {
            let total = table[y2 * stride + x2] + table[y1 * stride + x1];
            let minus = table[y1 * stride + x2] + table[y2 * stride + x1];
            (total - minus) as f64
        };

        let mean = window_sum(&self.sums) / count;
        let variance = (window_sum(&self.squares) / count - mean * mean).max(0.0);
        (mean, variance.sqrt())
    }
}
