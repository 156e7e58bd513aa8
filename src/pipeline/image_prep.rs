//! Shrinks oversized uploads before they are encoded for the model.

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};

/// Dimensions that fit inside `max_w`×`max_h` with the aspect ratio kept.
/// Images already inside the box are not upscaled.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (new_w, new_h)
}

/// Image bytes to send to the model: the original when it already fits,
/// otherwise a PNG re-encode of the downscaled image. Bytes that cannot be
/// decoded are passed through unchanged.
pub fn downscale_for_model(bytes: &[u8], max_w: u32, max_h: u32) -> Cow<'_, [u8]> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!(error = %e, "Image not decodable, sending as uploaded");
            return Cow::Borrowed(bytes);
        }
    };

    let (w, h) = img.dimensions();
    let (new_w, new_h) = fit_within(w, h, max_w, max_h);
    if (new_w, new_h) == (w, h) {
        return Cow::Borrowed(bytes);
    }

    tracing::debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling image for inference"
    );
    let resized = image::imageops::resize(&img.to_rgb8(), new_w, new_h, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    match DynamicImage::ImageRgb8(resized).write_to(&mut out, ImageOutputFormat::Png) {
        Ok(()) => Cow::Owned(out.into_inner()),
        Err(e) => {
            tracing::warn!(error = %e, "Could not re-encode downscaled image, sending original");
            Cow::Borrowed(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::image_gate::test_images::png_from;

    #[test]
    fn small_images_are_untouched() {
        assert_eq!(fit_within(640, 480, 896, 896), (640, 480));
        let png = png_from(32, 32, |x, _| x as u8);
        assert!(matches!(downscale_for_model(&png, 896, 896), Cow::Borrowed(_)));
    }

    #[test]
    fn aspect_ratio_is_kept() {
        assert_eq!(fit_within(2000, 1000, 896, 896), (896, 448));
        assert_eq!(fit_within(1000, 3000, 896, 896), (299, 896));
    }

    #[test]
    fn oversized_png_is_shrunk_into_the_box() {
        let png = png_from(200, 100, |x, y| (x + y) as u8);
        let out = downscale_for_model(&png, 64, 64);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[test]
    fn undecodable_bytes_pass_through() {
        let bytes = [0xFF, 0xD8, 0x00];
        assert_eq!(downscale_for_model(&bytes, 64, 64).as_ref(), &bytes);
    }
}
