use image::{imageops::FilterType, DynamicImage};
use ndarray::Array3;

/// Resizes to `size`×`size` RGB and scales pixels into [0, 1], HWC order.
pub fn preprocess(image: &DynamicImage, size: u32) -> Array3<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Nearest).to_rgb8();
    let side = size as usize;

    Array3::from_shape_fn((side, side, 3), |(y, x, c)| {
        let pixel = rgb.get_pixel(x as u32, y as u32);
        pixel[c] as f32 / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_preprocess_square() {
        let tensor = preprocess(&solid(100, 100, [255, 0, 0]), 64);
        assert_eq!(tensor.dim(), (64, 64, 3));
        assert_eq!(tensor[[0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 1]], 0.0);
        assert_eq!(tensor[[63, 63, 2]], 0.0);
    }

    #[test]
    fn test_preprocess_rectangle_is_stretched() {
        let tensor = preprocess(&solid(200, 30, [0, 0, 255]), 64);
        assert_eq!(tensor.dim(), (64, 64, 3));
        // no padding: every corner carries the image colour
        assert_eq!(tensor[[0, 0, 2]], 1.0);
        assert_eq!(tensor[[63, 0, 2]], 1.0);
        assert_eq!(tensor[[0, 63, 2]], 1.0);
    }

    #[test]
    fn test_preprocess_normalization() {
        let tensor = preprocess(&solid(10, 10, [128, 128, 128]), 64);
        let expected = 128.0 / 255.0;
        assert!(tensor.iter().all(|v| (v - expected).abs() < 0.0001));
    }

    #[test]
    fn test_preprocess_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            8,
            8,
            image::Rgba([0, 255, 0, 10]),
        ));
        let tensor = preprocess(&rgba, 64);
        assert_eq!(tensor.dim(), (64, 64, 3));
        assert_eq!(tensor[[5, 5, 1]], 1.0);
    }
}
