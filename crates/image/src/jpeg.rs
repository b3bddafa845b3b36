use {crate::*, base::Vec2, crates_image::ImageEncoder};

/// Map a unit quality (`0.0..=1.0`, as canvas encoders take it) onto the
/// JPEG encoder's `1..=100` scale.
pub fn quality_from_unit(quality: f32) -> u8 {
    if !quality.is_finite() {
        return 80;
    }
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

pub fn rgb_to_jpeg(size: Vec2<usize>, data: &[u8], quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let encoder = crates_image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(
            data,
            size.x as u32,
            size.y as u32,
            crates_image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Encode an image of any supported format as JPEG.
///
/// Frames that already are JPEG are passed through untouched.
pub fn encode_jpeg(image: &Image, quality: u8) -> Result<Vec<u8>, ImageError> {
    if image.format == PixelFormat::Jpeg {
        image.validate()?;
        return Ok(image.data.clone());
    }
    let rgb = to_rgb(image)?;
    rgb_to_jpeg(rgb.size, &rgb.data, quality)
}
