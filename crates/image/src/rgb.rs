use {crate::*, base::Vec2};

pub fn yuyv_to_rgb(size: Vec2<usize>, data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(size.area() * 3);

    for chunk in data.chunks_exact(4).take(size.area() / 2) {
        let (r0, g0, b0) = yuv_to_rgb(chunk[0], chunk[1], chunk[3]);
        let (r1, g1, b1) = yuv_to_rgb(chunk[2], chunk[1], chunk[3]);
        rgb.extend_from_slice(&[r0, g0, b0, r1, g1, b1]);
    }

    rgb
}

/// Planar 4:2:0. The caller guarantees `data` holds all three planes.
pub fn yu12_to_rgb(size: Vec2<usize>, data: &[u8]) -> Vec<u8> {
    let width = size.x;
    let height = size.y;
    let y_len = width * height;
    let uv_w = width / 2;

    let y_plane = &data[..y_len];
    let u_plane = &data[y_len..];
    let v_offset = uv_w * (height / 2);
    let v_plane = &data[y_len + v_offset..];

    let mut rgb = Vec::with_capacity(y_len * 3);

    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col];
            let uv = (row / 2) * uv_w + col / 2;
            let (r, g, b) = yuv_to_rgb(y, u_plane[uv], v_plane[uv]);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    rgb
}

pub fn argb_to_rgb(size: Vec2<usize>, data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .take(size.area())
        .flat_map(|c| [c[1], c[2], c[3]])
        .collect()
}

/// Decode JPEG (or any format the `image` crate sniffs) bytes into RGB.
pub fn decode_to_rgb(data: &[u8]) -> Result<Image, ImageError> {
    let decoded = crates_image::load_from_memory(data)
        .map_err(|e| ImageError::Decode(format!("failed to decode image: {e}")))?;

    let rgb_image = decoded.to_rgb8();
    let (width, height) = rgb_image.dimensions();
    let size = Vec2::new(width as usize, height as usize);

    Ok(Image::new(size, rgb_image.into_raw(), PixelFormat::Rgb8))
}

pub fn jpeg_to_rgb(image: &Image) -> Result<Image, ImageError> {
    image.format.ensure_format(PixelFormat::Jpeg)?;
    decode_to_rgb(&image.data)
}

/// Convert any supported image to packed RGB.
pub fn to_rgb(image: &Image) -> Result<Image, ImageError> {
    image.validate()?;
    let size = image.size;
    let data = match image.format {
        PixelFormat::Rgb8 => return Ok(image.clone()),
        PixelFormat::Jpeg => return jpeg_to_rgb(image),
        PixelFormat::Argb8 => argb_to_rgb(size, &image.data),
        PixelFormat::Yuyv => {
            if size.x % 2 != 0 {
                return Err(ImageError::Size(format!("YUYV width must be even, got {}", size.x)));
            }
            yuyv_to_rgb(size, &image.data)
        }
        PixelFormat::Yu12 => {
            if size.x % 2 != 0 || size.y % 2 != 0 {
                return Err(ImageError::Size(format!("YU12 size must be even, got {size}")));
            }
            yu12_to_rgb(size, &image.data)
        }
    };
    Ok(Image::new(size, data, PixelFormat::Rgb8))
}
