//! Decoding embedded pictures and encoding saved covers.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageResult};
use std::path::{Path, PathBuf};

/// Extension of saved cover files.
pub const COVER_EXTENSION: &str = "jpg";

/// A cover resized for storage, with the grayscale copy used for hashing.
#[derive(Debug, Clone)]
pub struct PreparedCover {
    /// The resized color image, JPEG-encoded.
    pub jpeg: Vec<u8>,
    /// The resized image in grayscale.
    pub gray: GrayImage,
}

/// Decode `data`, resize it to a `size`×`size` square and encode it.
pub fn prepare_cover(data: &[u8], size: u32, quality: u8) -> ImageResult<PreparedCover> {
    let img = image::load_from_memory(data)?;
    let resized = img.resize_exact(size, size, FilterType::Lanczos3);

    Ok(PreparedCover {
        jpeg: encode_jpeg(&resized, quality)?,
        gray: resized.to_luma8(),
    })
}

/// Encode `img` as an RGB JPEG at the given `quality`.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Load a saved cover from disk in grayscale.
pub fn load_gray(path: &Path) -> ImageResult<GrayImage> {
    Ok(image::open(path)?.to_luma8())
}

/// File name of the cover with the given index, e.g. `12.jpg`.
#[must_use]
pub fn cover_file_name(index: u32) -> String {
    format!("{index}.{COVER_EXTENSION}")
}

#[must_use]
pub fn cover_path(images_dir: &Path, index: u32) -> PathBuf {
    images_dir.join(cover_file_name(index))
}

/// Parse the index back out of a cover file name.
pub fn cover_index(path: &Path) -> Option<u32> {
    let is_cover = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(COVER_EXTENSION));
    if !is_cover {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .parse()
        .ok()
        .filter(|index| *index > 0)
}
