//! Color conversions at the edges of the pipeline.
//!
//! The caller hands over a [`DynamicImage`] in whatever layout it was
//! decoded as. Thresholding works on luminance; the watershed and the
//! visualization work on an RGB copy.

use image::{DynamicImage, GrayImage, RgbImage};

/// Convert any image to 8-bit grayscale.
///
/// Uses the `image` crate's luminance weights. A single-channel 8-bit
/// input is copied unchanged.
#[must_use = "returns the grayscale image"]
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Convert any image to 8-bit RGB, replicating gray into all channels.
#[must_use = "returns the RGB image"]
pub fn to_rgb(image: &DynamicImage) -> RgbImage {
    image.to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_input_is_unchanged() {
        let gray = GrayImage::from_fn(3, 2, |x, y| image::Luma([u8::try_from(x * 10 + y).unwrap_or(0)]));
        let out = to_gray(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(out, gray);
    }

    #[test]
    fn white_rgb_becomes_white_gray() {
        let rgb = RgbImage::from_pixel(2, 2, image::Rgb([255, 255, 255]));
        let out = to_gray(&DynamicImage::ImageRgb8(rgb));
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn red_is_darker_than_green() {
        let rgb = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 255, 0])
            }
        });
        let out = to_gray(&DynamicImage::ImageRgb8(rgb));
        assert!(out.get_pixel(0, 0).0[0] < out.get_pixel(1, 0).0[0]);
    }

    #[test]
    fn to_rgb_replicates_gray_channels() {
        let gray = GrayImage::from_pixel(1, 1, image::Luma([77]));
        assert_eq!(to_rgb(&DynamicImage::ImageLuma8(gray)).get_pixel(0, 0).0, [77, 77, 77]);
    }
}
