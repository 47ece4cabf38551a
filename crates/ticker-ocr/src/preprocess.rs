use analysis_core::Rect;
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma};

/// Mask value for ink pixels
pub const INK: u8 = 255;

/// Luminance histogram threshold that maximises between-class variance.
///
/// Returns `None` for uniform images, where no split exists.
pub fn otsu_threshold(gray: &GrayImage) -> Option<u8> {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 || histogram.iter().filter(|&&c| c > 0).count() < 2 {
        return None;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0u64;
    let mut best_threshold = 0u8;
    let mut best_variance = -1.0;

    for t in 0..256usize {
        weight_bg += histogram[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * histogram[t] as f64;

        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);

        // Strict comparison keeps the lowest threshold on plateaus
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }

    Some(best_threshold)
}

/// Binarize a capture into an ink mask (255 = ink, 0 = background).
///
/// The minority side of the Otsu split is taken as ink, so both dark-on-light
/// and light-on-dark text work. Uniform images give an empty mask.
pub fn ink_mask(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut mask = GrayImage::new(width, height);

    let Some(threshold) = otsu_threshold(&gray) else {
        return mask;
    };

    let bright = gray.pixels().filter(|p| p.0[0] > threshold).count();
    let ink_is_bright = bright * 2 <= (width as usize * height as usize);

    for (x, y, p) in gray.enumerate_pixels() {
        let is_bright = p.0[0] > threshold;
        if is_bright == ink_is_bright {
            mask.put_pixel(x, y, Luma([INK]));
        }
    }

    mask
}

/// Clear every mask pixel inside the given zones
pub fn clear_zones(mask: &mut GrayImage, zones: &[Rect]) {
    let (width, height) = mask.dimensions();
    for zone in zones {
        let x_end = zone.right().min(width);
        let y_end = zone.bottom().min(height);
        for y in zone.y.min(height)..y_end {
            for x in zone.x.min(width)..x_end {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
    }
}

/// Copy the pixels under `rect` (clipped to the image)
pub fn crop(mask: &GrayImage, rect: &Rect) -> GrayImage {
    let (width, height) = mask.dimensions();
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    let w = rect.width.min(width - x);
    let h = rect.height.min(height - y);
    imageops::crop_imm(mask, x, y, w, h).to_image()
}

/// Tight bounding box of all ink pixels
pub fn ink_bounds(mask: &GrayImage) -> Option<Rect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] >= 128 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| Rect::from_corners(min_x, min_y, max_x, max_y))
}

/// Normalize an ink mask to template dimensions.
///
/// Crops to the ink, scales to fit `width` x `height` keeping the aspect
/// ratio, centers on a blank canvas and re-binarizes. `None` when the mask
/// has no ink or a zero-sized target is requested.
pub fn normalize_glyph(mask: &GrayImage, width: u32, height: u32) -> Option<GrayImage> {
    if width == 0 || height == 0 {
        return None;
    }

    let bounds = ink_bounds(mask)?;
    let glyph = crop(mask, &bounds);

    let scale = (width as f64 / bounds.width as f64).min(height as f64 / bounds.height as f64);
    let new_w = ((bounds.width as f64 * scale).round() as u32).clamp(1, width);
    let new_h = ((bounds.height as f64 * scale).round() as u32).clamp(1, height);

    let scaled = if (new_w, new_h) == glyph.dimensions() {
        glyph
    } else {
        imageops::resize(&glyph, new_w, new_h, FilterType::Triangle)
    };

    let mut canvas = GrayImage::new(width, height);
    let off_x = (width - new_w) / 2;
    let off_y = (height - new_h) / 2;
    for (x, y, p) in scaled.enumerate_pixels() {
        let v = if p.0[0] >= 128 { INK } else { 0 };
        canvas.put_pixel(off_x + x, off_y + y, Luma([v]));
    }

    ink_bounds(&canvas)?;
    Some(canvas)
}
