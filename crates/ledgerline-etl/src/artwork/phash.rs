//! Perceptual image fingerprints.

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::f64::consts::PI;
use std::fmt;

/// Edge of the downscaled image fed to the DCT.
const DCT_INPUT: usize = 32;

/// Edge of the low-frequency block kept from the DCT (8×8 = 64 bits).
const HASH_SIDE: usize = 8;

/// A 64-bit perceptual fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHash(u64);

impl ImageHash {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance between two fingerprints.
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Computes fingerprints of grayscale images and compares them.
pub trait PerceptualHasher: Send + Sync + fmt::Debug {
    fn hash(&self, image: &GrayImage) -> ImageHash;

    fn distance(&self, a: ImageHash, b: ImageHash) -> u32 {
        a.distance(b)
    }
}

/// DCT-based perceptual hash (pHash).
///
/// The image is shrunk to 32×32, transformed with a 2-D DCT-II, and the
/// 8×8 lowest frequencies are compared to their mean with the DC term
/// zeroed. Each coefficient above the mean sets one bit.
#[derive(Debug, Clone)]
pub struct DctHasher {
    /// `cosines[k][x]`: orthonormal DCT-II basis for the first
    /// [`HASH_SIDE`] frequencies.
    cosines: Vec<[f64; DCT_INPUT]>,
}

impl Default for DctHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl DctHasher {
    #[must_use]
    pub fn new() -> Self {
        let n = DCT_INPUT as f64;
        let cosines = (0..HASH_SIDE)
            .map(|k| {
                let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                let mut row = [0.0; DCT_INPUT];
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = scale * (PI * (2.0 * x as f64 + 1.0) * k as f64 / (2.0 * n)).cos();
                }
                row
            })
            .collect();
        Self { cosines }
    }

    /// Low-frequency DCT block of `image`, indexed `[v][u]`.
    fn low_frequencies(&self, image: &GrayImage) -> [[f64; HASH_SIDE]; HASH_SIDE] {
        let small = imageops::resize(
            image,
            DCT_INPUT as u32,
            DCT_INPUT as u32,
            FilterType::Triangle,
        );
        let pixel = |x: usize, y: usize| f64::from(small.get_pixel(x as u32, y as u32).0[0]);

        // Rows first: rows[y][u]
        let mut rows = [[0.0; HASH_SIDE]; DCT_INPUT];
        for (y, row) in rows.iter_mut().enumerate() {
            for (u, coeff) in row.iter_mut().enumerate() {
                *coeff = (0..DCT_INPUT)
                    .map(|x| pixel(x, y) * self.cosines[u][x])
                    .sum();
            }
        }

        let mut block = [[0.0; HASH_SIDE]; HASH_SIDE];
        for (v, out) in block.iter_mut().enumerate() {
            for (u, coeff) in out.iter_mut().enumerate() {
                *coeff = (0..DCT_INPUT)
                    .map(|y| rows[y][u] * self.cosines[v][y])
                    .sum();
            }
        }
        block
    }
}

impl PerceptualHasher for DctHasher {
    fn hash(&self, image: &GrayImage) -> ImageHash {
        let mut block = self.low_frequencies(image);
        block[0][0] = 0.0;

        let mean = block.iter().flatten().sum::<f64>() / (HASH_SIDE * HASH_SIDE) as f64;

        let bits = block
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, coeff)| **coeff > mean)
            .fold(0u64, |bits, (i, _)| bits | (1 << i));
        ImageHash(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut state = seed;
        GrayImage::from_fn(width, height, |_, _| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            Luma([(state >> 56) as u8])
        })
    }

    fn waves(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let fx = f64::from(x) / f64::from(width) * PI;
            let fy = f64::from(y) / f64::from(height) * PI;
            let value = 128.0 + 60.0 * (3.0 * fx).sin() * (2.0 * fy).cos() + 40.0 * (fx + 4.0 * fy).cos();
            Luma([value.clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_distance() {
        let a = ImageHash::from_bits(0b1011);
        let b = ImageHash::from_bits(0b0001);
        assert_eq!(a.distance(b), 2);
        assert_eq!(a.distance(a), 0);
        assert_eq!(ImageHash::from_bits(0).distance(ImageHash::from_bits(u64::MAX)), 64);
    }

    #[test]
    fn test_display_is_fixed_width_hex() {
        assert_eq!(ImageHash::from_bits(0xab).to_string(), "00000000000000ab");
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = DctHasher::new();
        let img = noise(64, 64, 7);
        assert_eq!(hasher.hash(&img), hasher.hash(&img));
    }

    #[test]
    fn test_hash_survives_rescaling() {
        let hasher = DctHasher::new();
        let img = waves(64, 64);
        let larger = imageops::resize(&img, 256, 256, FilterType::Lanczos3);
        assert!(hasher.hash(&img).distance(hasher.hash(&larger)) < 10);
    }

    #[test]
    fn test_different_images_are_far_apart() {
        let hasher = DctHasher::new();
        let a = hasher.hash(&noise(64, 64, 1));
        let b = hasher.hash(&noise(64, 64, 2));
        assert!(a.distance(b) >= 10, "distance was {}", a.distance(b));
    }
}
