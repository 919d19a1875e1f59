//! Difference and average hashes over a downsampled grayscale grid.
//!
//! Both hashes pack their bits four at a time, most significant bit first,
//! into lowercase hex. A 9x8 difference grid and an 8x8 average grid each
//! produce 64 bits, i.e. 16 hex digits.

use image::imageops::{self, FilterType};

use crate::error::HashError;
use crate::models::FingerprintPair;

use super::Frame;

pub const DIFFERENCE_SAMPLE: (u32, u32) = (9, 8);
pub const AVERAGE_SAMPLE: (u32, u32) = (8, 8);

/// Fingerprint a frame with the default sample grids.
pub fn fingerprint(frame: &Frame) -> Result<FingerprintPair, HashError> {
    let (dw, dh) = DIFFERENCE_SAMPLE;
    let (aw, ah) = AVERAGE_SAMPLE;
    Ok(FingerprintPair::new(
        compute_difference_hash(frame, dw, dh)?,
        compute_average_hash(frame, aw, ah)?,
    ))
}

/// Bit is 1 where a sample is brighter than its right-hand neighbour.
pub fn compute_difference_hash(
    frame: &Frame,
    sample_width: u32,
    sample_height: u32,
) -> Result<String, HashError> {
    if sample_width < 2 || sample_height == 0 {
        return Err(HashError::InvalidSampleSize {
            width: sample_width,
            height: sample_height,
        });
    }

    let gray = luma_grid(frame, sample_width, sample_height);
    let w = sample_width as usize;
    let mut bits = Vec::with_capacity((w - 1) * sample_height as usize);
    for row in gray.chunks_exact(w) {
        for pair in row.windows(2) {
            bits.push(pair[0] > pair[1]);
        }
    }
    Ok(pack_bits(&bits))
}

/// Bit is 1 where a sample is at least the grid's mean luma.
pub fn compute_average_hash(
    frame: &Frame,
    sample_width: u32,
    sample_height: u32,
) -> Result<String, HashError> {
    if sample_width == 0 || sample_height == 0 {
        return Err(HashError::InvalidSampleSize {
            width: sample_width,
            height: sample_height,
        });
    }

    let gray = luma_grid(frame, sample_width, sample_height);
    let mean = gray.iter().sum::<f64>() / gray.len() as f64;
    let bits: Vec<bool> = gray.iter().map(|&v| v >= mean).collect();
    Ok(pack_bits(&bits))
}

fn luma_grid(frame: &Frame, width: u32, height: u32) -> Vec<f64> {
    let small = imageops::resize(frame.pixels(), width, height, FilterType::Triangle);
    small
        .pixels()
        .map(|p| {
            let [r, g, b, _] = p.0;
            0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
        })
        .collect()
}

/// MSB-first nibbles; a trailing partial nibble is zero-padded.
fn pack_bits(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|chunk| {
            let nibble = chunk
                .iter()
                .enumerate()
                .fold(0u32, |acc, (i, &bit)| acc | (u32::from(bit) << (3 - i)));
            char::from_digit(nibble, 16).unwrap_or('0')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn frame_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> Frame {
        Frame::from_rgba(RgbaImage::from_fn(w, h, |x, y| {
            let v = f(x, y);
            Rgba([v, v, v, 255])
        }))
        .unwrap()
    }

    #[test]
    fn packs_msb_first() {
        assert_eq!(pack_bits(&[true, false, false, false]), "8");
        assert_eq!(pack_bits(&[false, false, false, true, true, true, true, true]), "1f");
        assert_eq!(pack_bits(&[true, true]), "c");
    }

    #[test]
    fn hashes_have_expected_length() {
        let frame = frame_from_fn(64, 48, |x, y| ((x * 7 + y * 3) % 256) as u8);
        let pair = fingerprint(&frame).unwrap();
        assert_eq!(pair.difference.len(), 16);
        assert_eq!(pair.average.as_deref().map(str::len), Some(16));
    }

    #[test]
    fn hashes_are_deterministic() {
        let frame = frame_from_fn(320, 240, |x, y| ((x ^ y) % 256) as u8);
        let first = fingerprint(&frame).unwrap();
        for _ in 0..3 {
            assert_eq!(fingerprint(&frame).unwrap(), first);
        }
    }

    #[test]
    fn flat_frame_hashes() {
        // Equal neighbours never set a difference bit; every sample equals the mean.
        let frame = frame_from_fn(90, 80, |_, _| 0);
        assert_eq!(compute_difference_hash(&frame, 9, 8).unwrap(), "0000000000000000");
        assert_eq!(compute_average_hash(&frame, 8, 8).unwrap(), "ffffffffffffffff");
    }

    #[test]
    fn left_bright_gradient_sets_every_difference_bit() {
        // Exactly one source column per sample so the filter never blends neighbours.
        let frame = frame_from_fn(9, 8, |x, _| 255 - (x as u8) * 30);
        assert_eq!(compute_difference_hash(&frame, 9, 8).unwrap(), "ffffffffffffffff");
    }

    #[test]
    fn average_hash_splits_halves() {
        // Top half bright, bottom half dark.
        let frame = frame_from_fn(8, 8, |_, y| if y < 4 { 250 } else { 5 });
        assert_eq!(compute_average_hash(&frame, 8, 8).unwrap(), "ffffffff00000000");
    }

    #[test]
    fn luma_weights_channels() {
        let red = Frame::from_rgba(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]))).unwrap();
        let gray = luma_grid(&red, 1, 1);
        assert!((gray[0] - 0.299 * 255.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_degenerate_grids() {
        let frame = frame_from_fn(4, 4, |_, _| 0);
        assert_eq!(
            compute_difference_hash(&frame, 1, 8),
            Err(HashError::InvalidSampleSize { width: 1, height: 8 })
        );
        assert!(compute_average_hash(&frame, 8, 0).is_err());
    }
}
