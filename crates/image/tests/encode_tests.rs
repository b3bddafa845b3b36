use {
    base::Vec2,
    image::{Image, PixelFormat, decode_to_rgb, encode_jpeg, jpeg_to_rgb, quality_from_unit, rgb_to_jpeg},
};

fn gradient(size: Vec2<usize>) -> Vec<u8> {
    (0..size.area() * 3).map(|v| (v % 251) as u8).collect()
}

#[test]
fn test_rgb_to_jpeg_has_soi_marker() {
    let size = Vec2::new(4, 4);
    let jpeg = rgb_to_jpeg(size, &gradient(size), 90).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_quality_affects_size() {
    let size = Vec2::new(32, 32);
    let data = gradient(size);
    let low = rgb_to_jpeg(size, &data, 10).unwrap();
    let high = rgb_to_jpeg(size, &data, 100).unwrap();
    assert!(low.len() < high.len());
}

#[test]
fn test_quality_from_unit() {
    assert_eq!(quality_from_unit(0.8), 80);
    assert_eq!(quality_from_unit(0.7), 70);
    assert_eq!(quality_from_unit(0.0), 1);
    assert_eq!(quality_from_unit(1.5), 100);
    assert_eq!(quality_from_unit(f32::NAN), 80);
}

#[test]
fn test_jpeg_decodes_back_to_same_size() {
    let size = Vec2::new(640, 480);
    let jpeg = rgb_to_jpeg(size, &gradient(size), 80).unwrap();
    let decoded = jpeg_to_rgb(&Image::new(size, jpeg, PixelFormat::Jpeg)).unwrap();
    assert_eq!(decoded.size, size);
    assert_eq!(decoded.format, PixelFormat::Rgb8);
    assert_eq!(decoded.data.len(), size.area() * 3);
}

#[test]
fn test_encode_jpeg_passes_jpeg_through() {
    let size = Vec2::new(8, 8);
    let jpeg = rgb_to_jpeg(size, &gradient(size), 80).unwrap();
    let frame = Image::new(size, jpeg.clone(), PixelFormat::Jpeg);
    assert_eq!(encode_jpeg(&frame, 50).unwrap(), jpeg);
}

#[test]
fn test_encode_jpeg_converts_yuyv() {
    let size = Vec2::new(16, 8);
    let frame = Image::new(size, vec![128u8; size.area() * 2], PixelFormat::Yuyv);
    let jpeg = encode_jpeg(&frame, 75).unwrap();
    assert_eq!(decode_to_rgb(&jpeg).unwrap().size, size);
}

#[test]
fn test_invalid_jpeg_is_a_decode_error() {
    assert!(decode_to_rgb(b"not a jpeg at all").is_err());
    let bogus = Image::new(Vec2::new(4, 4), vec![0u8; 10], PixelFormat::Jpeg);
    assert!(jpeg_to_rgb(&bogus).is_err());
}
