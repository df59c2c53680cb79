//! Gaussian blur specified by an odd kernel size.
//!
//! Analysis parameters describe smoothing as a square kernel size (5 for
//! fractures, 7 for pores). [`sigma_for_kernel`] maps that size to a
//! standard deviation and [`gaussian_blur`] hands it to
//! [`imageproc::filter::gaussian_blur_f32`].

use image::GrayImage;

/// Kernel size used when a parameter set does not name one.
pub const DEFAULT_KERNEL_SIZE: u32 = 5;

/// Standard deviation implied by a square Gaussian kernel of `kernel_size`.
///
/// Follows the conventional `0.3 * ((k - 1) * 0.5 - 1) + 0.8` rule, so a
/// 5×5 kernel gives sigma 1.1 and a 7×7 kernel gives sigma 1.4.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    let k = kernel_size as f32;
    0.3f32.mul_add((k - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Blur a grayscale image with a Gaussian of the given kernel size.
///
/// Kernel sizes below 2 return the image unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size < 2 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma_for_kernel(kernel_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn sigma_matches_kernel_rule() {
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-5);
        assert!((sigma_for_kernel(7) - 1.4).abs() < 1e-5);
        assert!((sigma_for_kernel(3) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn small_kernel_returns_unchanged() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 0), img);
        assert_eq!(gaussian_blur(&img, 1), img);
    }

    #[test]
    fn blur_softens_edge() {
        let img = sharp_edge_image();
        let blurred = gaussian_blur(&img, DEFAULT_KERNEL_SIZE);
        let left = blurred.get_pixel(4, 5).0[0];
        let right = blurred.get_pixel(5, 5).0[0];
        assert!(left > 0, "left of edge should brighten, got {left}");
        assert!(right < 255, "right of edge should darken, got {right}");
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let img = GrayImage::from_pixel(12, 12, image::Luma([90]));
        let blurred = gaussian_blur(&img, 7);
        assert!(blurred.pixels().all(|p| p.0[0].abs_diff(90) <= 1));
    }
}
