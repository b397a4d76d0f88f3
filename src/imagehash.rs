//! Perceptual and content hashing of decoded images
//!
//! Two independent hash spaces back the two dedup layers: a
//! similarity-tolerant average hash for the in-session check, and an exact
//! blake3 digest of the raw pixel bytes for the persisted manifest.

use image::imageops::FilterType;
use image::DynamicImage;

/// 8x8 average hash. Downscale to grayscale, threshold each cell against
/// the mean, pack the 64 bits.
pub fn average_hash(img: &DynamicImage) -> u64 {
    let small = img.resize_exact(8, 8, FilterType::Triangle).to_luma8();
    let sum: u64 = small.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = sum / 64;

    let mut bits = 0u64;
    for (i, p) in small.pixels().enumerate() {
        if u64::from(p.0[0]) > mean {
            bits |= 1 << i;
        }
    }
    bits
}

/// Exact content hash over decoded RGBA pixel bytes, hex-encoded.
/// Byte-identical pixels hash equal regardless of the container encoding.
pub fn content_hash(img: &DynamicImage) -> String {
    blake3::hash(img.to_rgba8().as_raw()).to_hex().to_string()
}
