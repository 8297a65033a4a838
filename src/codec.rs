//! Pixel-to-tensor conversion.
//!
//! Converts a decoded bitmap into the flat float layout the model consumes.
//! Two paths, chosen by the target shape's last dimension: grayscale (one
//! weighted-luminance float per pixel) and color (three floats per pixel in
//! B, G, R order — the model was trained on that channel order, so it is
//! deliberate and load-bearing). Each emitted scalar has the next mean-image
//! sample subtracted, consuming the mean buffer sequentially.

use image::RgbaImage;

use crate::tensor::{element_count, Tensor};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("mean image has {actual} samples, tensor needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("bitmap {width}x{height} does not fill tensor shape {dims:?}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        dims: Vec<usize>,
    },
}

/// Converts `bitmap` into a tensor of shape `dims`, subtracting `mean`
/// sample-by-sample.
///
/// Pure transformation: no side effects, no partial output. Fails when the
/// mean sample count does not exactly match the tensor element count, or when
/// the bitmap's pixel count cannot fill the requested shape.
pub fn encode_bitmap(bitmap: &RgbaImage, dims: &[usize], mean: &[f32]) -> Result<Tensor, CodecError> {
    let expected = element_count(dims);
    if mean.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: mean.len(),
        });
    }

    let (width, height) = bitmap.dimensions();
    let pixels = width as usize * height as usize;
    let grayscale = dims.last() == Some(&1);
    let channels = if grayscale { 1 } else { 3 };
    if pixels * channels != expected {
        return Err(CodecError::ShapeMismatch {
            width,
            height,
            dims: dims.to_vec(),
        });
    }

    let mut buffer = Vec::with_capacity(expected);
    let mut next_mean = 0usize;

    // Row-major scan; pixels() iterates rows top to bottom.
    if grayscale {
        for pixel in bitmap.pixels() {
            let [r, g, b, _] = pixel.0;
            let luminance =
                f32::from(r) * 0.3 + f32::from(g) * 0.59 + f32::from(b) * 0.11;
            buffer.push(luminance - mean[next_mean]);
            next_mean += 1;
        }
    } else {
        for pixel in bitmap.pixels() {
            let [r, g, b, _] = pixel.0;
            buffer.push(f32::from(b) - mean[next_mean]);
            buffer.push(f32::from(g) - mean[next_mean + 1]);
            buffer.push(f32::from(r) - mean[next_mean + 2]);
            next_mean += 3;
        }
    }

    // Lengths were validated above, so this cannot fail.
    Tensor::new(dims.to_vec(), buffer).map_err(|_| CodecError::ShapeMismatch {
        width,
        height,
        dims: dims.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    fn solid_bitmap(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn color_path_emits_bgr_per_pixel() {
        let bitmap = solid_bitmap(2, 2, [10, 20, 30, 255]);
        let mean = vec![0.0; 12];

        let tensor = encode_bitmap(&bitmap, &[2, 2, 3], &mean).unwrap();

        assert_eq!(tensor.len(), 12);
        for pixel in tensor.data().chunks_exact(3) {
            assert_eq!(pixel, &[30.0, 20.0, 10.0]);
        }
    }

    #[test]
    fn color_path_subtracts_mean_sequentially() {
        let bitmap = solid_bitmap(1, 2, [100, 50, 25, 255]);
        let mean = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let tensor = encode_bitmap(&bitmap, &[1, 2, 3], &mean).unwrap();

        assert_eq!(
            tensor.data(),
            &[25.0 - 1.0, 50.0 - 2.0, 100.0 - 3.0, 25.0 - 4.0, 50.0 - 5.0, 100.0 - 6.0]
        );
    }

    #[test]
    fn grayscale_path_uses_weighted_luminance() {
        let bitmap = solid_bitmap(2, 1, [200, 100, 50, 255]);
        let mean = vec![10.0, 20.0];

        let tensor = encode_bitmap(&bitmap, &[2, 1, 1], &mean).unwrap();

        let luminance = 200.0 * 0.3 + 100.0 * 0.59 + 50.0 * 0.11;
        assert!((tensor.data()[0] - (luminance - 10.0)).abs() < 1e-4);
        assert!((tensor.data()[1] - (luminance - 20.0)).abs() < 1e-4);
    }

    #[test]
    fn grayscale_is_chosen_by_last_dimension() {
        let bitmap = solid_bitmap(3, 3, [0, 0, 0, 255]);

        let tensor = encode_bitmap(&bitmap, &[3, 3, 1], &[0.0; 9]).unwrap();

        assert_eq!(tensor.len(), 9);
    }

    #[test]
    fn mean_count_mismatch_is_rejected() {
        let bitmap = solid_bitmap(2, 2, [0, 0, 0, 255]);
        let mean = vec![0.0; 11]; // one short of 2*2*3

        let err = encode_bitmap(&bitmap, &[2, 2, 3], &mean).unwrap_err();

        assert!(matches!(
            err,
            CodecError::SizeMismatch {
                expected: 12,
                actual: 11,
            }
        ));
    }

    #[test]
    fn bitmap_shape_mismatch_is_rejected() {
        let bitmap = solid_bitmap(4, 4, [0, 0, 0, 255]);

        let err = encode_bitmap(&bitmap, &[2, 2, 3], &[0.0; 12]).unwrap_err();

        assert!(matches!(err, CodecError::ShapeMismatch { .. }));
    }

    #[test]
    fn scan_order_is_row_major() {
        let mut bitmap = solid_bitmap(2, 2, [0, 0, 0, 255]);
        // Mark the last pixel of the first row.
        bitmap.put_pixel(1, 0, Rgba([0, 0, 255, 255]));

        let tensor = encode_bitmap(&bitmap, &[2, 2, 3], &[0.0; 12]).unwrap();

        // Second pixel in scan order, blue channel first.
        assert_eq!(tensor.data()[3], 255.0);
    }

    proptest! {
        #[test]
        fn color_output_length_is_pixels_times_three(
            w in 1u32..16,
            h in 1u32..16,
            r in 0u8..=255,
            g in 0u8..=255,
            b in 0u8..=255,
        ) {
            let bitmap = solid_bitmap(w, h, [r, g, b, 255]);
            let dims = vec![h as usize, w as usize, 3];
            let mean = vec![0.0; (w * h * 3) as usize];

            let tensor = encode_bitmap(&bitmap, &dims, &mean).unwrap();

            prop_assert_eq!(tensor.len(), (w * h * 3) as usize);
            for pixel in tensor.data().chunks_exact(3) {
                prop_assert_eq!(pixel, &[f32::from(b), f32::from(g), f32::from(r)]);
            }
        }

        #[test]
        fn grayscale_output_length_is_pixel_count(w in 1u32..16, h in 1u32..16) {
            let bitmap = solid_bitmap(w, h, [128, 64, 32, 255]);
            let dims = vec![h as usize, w as usize, 1];
            let mean = vec![0.0; (w * h) as usize];

            let tensor = encode_bitmap(&bitmap, &dims, &mean).unwrap();

            prop_assert_eq!(tensor.len(), (w * h) as usize);
        }
    }
}
