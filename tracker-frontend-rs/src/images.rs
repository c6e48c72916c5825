//! Profile picture normalization: any decodable image becomes a small square, center cropped, ready to be stored
//! inline as a data URI.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{
    DynamicImage, ExtendedColorType, GenericImageView as _, ImageEncoder as _, Rgb, RgbImage,
    codecs::jpeg::JpegEncoder, imageops::FilterType,
};

pub const DEFAULT_SIZE: u32 = 320;
/// JPEG quality, 1 to 100.
pub const DEFAULT_QUALITY: u8 = 85;

/// `image` can only write lossless WebP, which comes out larger than the source photo, so avatars are always
/// lossy JPEG. WebP uploads still decode.
pub const MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Cannot draw a {width}x{height} image onto a {size}x{size} square")]
    Surface { width: u32, height: u32, size: u32 },
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{MIME_TYPE};base64,{}", STANDARD.encode(&self.bytes))
    }
}

/// Scale `image` to cover a `size`x`size` square and cut away the overflow evenly on both sides.
pub fn crop_to_square(image: &DynamicImage, size: u32) -> Result<DynamicImage, ImageError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || size == 0 {
        return Err(ImageError::Surface {
            width,
            height,
            size,
        });
    }

    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    Ok(image
        .crop_imm(x, y, side, side)
        .resize_exact(size, size, FilterType::Lanczos3))
}

// JPEG has no alpha channel, transparent pixels go white instead of black
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((u16::from(c) * u16::from(a) + 255 * (255 - u16::from(a))) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode as JPEG at `quality`, clamped to 1..=100.
pub fn encode_compact(image: &DynamicImage, quality: u8) -> Result<EncodedImage, ImageError> {
    let (width, height) = image.dimensions();
    let rgb = flatten_onto_white(image);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(ImageError::Encode)?;
    Ok(EncodedImage { bytes })
}

pub fn normalize_square(bytes: &[u8], size: u32, quality: u8) -> Result<EncodedImage, ImageError> {
    let image = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    let square = crop_to_square(&image, size)?;
    encode_compact(&square, quality)
}

/// An uploaded picture as a square data URI, with the default size and quality.
pub fn square_avatar_data_url(bytes: &[u8]) -> Result<String, ImageError> {
    normalize_square(bytes, DEFAULT_SIZE, DEFAULT_QUALITY).map(|encoded| encoded.to_data_url())
}
