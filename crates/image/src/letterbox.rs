use {
    crate::*,
    base::Vec2,
    crates_image::{Rgb, RgbImage, imageops},
};

/// Where a scaled source lands inside the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: Vec2<usize>,
    pub size: Vec2<usize>,
}

/// Scale `source` to fit inside `target` without distortion, centered.
///
/// A source wider than the target is scaled to the full target width and
/// gets bars above and below; otherwise it is scaled to the full target
/// height and gets bars left and right.
pub fn fit_within(source: Vec2<usize>, target: Vec2<usize>) -> Result<Placement, ImageError> {
    if source.x == 0 || source.y == 0 || target.x == 0 || target.y == 0 {
        return Err(ImageError::Size(format!(
            "cannot fit {} into {}",
            source, target
        )));
    }

    // compare aspect ratios without floating point: sx/sy > tx/ty
    let wider = source.x as u128 * target.y as u128 > target.x as u128 * source.y as u128;

    let size = if wider {
        let height = rounded_div(target.x as u128 * source.y as u128, source.x as u128);
        Vec2::new(target.x, height.clamp(1, target.y))
    } else {
        let width = rounded_div(target.y as u128 * source.x as u128, source.y as u128);
        Vec2::new(width.clamp(1, target.x), target.y)
    };

    Ok(Placement {
        offset: Vec2::new((target.x - size.x) / 2, (target.y - size.y) / 2),
        size,
    })
}

fn rounded_div(numerator: u128, denominator: u128) -> usize {
    ((2 * numerator + denominator) / (2 * denominator)) as usize
}

/// Letterbox `image` onto a black RGB canvas of exactly `target` size.
pub fn letterbox(image: &Image, target: Vec2<usize>) -> Result<Image, ImageError> {
    let rgb = to_rgb(image)?;
    let placement = fit_within(rgb.size, target)?;

    let source = RgbImage::from_raw(rgb.size.x as u32, rgb.size.y as u32, rgb.data)
        .ok_or_else(|| ImageError::Size(format!("RGB buffer too small for {}", rgb.size)))?;

    if placement.size == rgb.size && placement.offset == Vec2::zero() {
        return Ok(Image::new(target, source.into_raw(), PixelFormat::Rgb8));
    }

    let scaled = if placement.size == rgb.size {
        source
    } else {
        imageops::resize(
            &source,
            placement.size.x as u32,
            placement.size.y as u32,
            imageops::FilterType::Triangle,
        )
    };

    let mut canvas = RgbImage::from_pixel(target.x as u32, target.y as u32, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &scaled,
        placement.offset.x as i64,
        placement.offset.y as i64,
    );

    Ok(Image::new(target, canvas.into_raw(), PixelFormat::Rgb8))
}
