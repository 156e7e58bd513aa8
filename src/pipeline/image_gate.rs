//! Pass/fail image quality gate run before inference.
//!
//! Rejects images that cannot carry a diagnostic signal: almost black,
//! almost white, or flat. Statistics run over every RGB channel value.

use super::drafting::ImageInput;

/// Mean below this: too dark.
pub const MIN_MEAN: f64 = 20.0;
/// Mean above this: overexposed.
pub const MAX_MEAN: f64 = 240.0;
/// Standard deviation below this: uniform or corrupt.
pub const MIN_STD: f64 = 5.0;

pub trait ImageQualityGate: Send + Sync {
    /// `Ok(())` when the image is usable, otherwise the user-facing reason.
    fn check(&self, image: &ImageInput) -> Result<(), String>;
}

/// Luminance statistics gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuminanceGate;

/// Mean and population standard deviation of all RGB channel values.
pub fn channel_stats(rgb: &image::RgbImage) -> (f64, f64) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for value in rgb.as_raw() {
        let v = *value as f64;
        sum += v;
        sum_sq += v * v;
        count += 1;
    }

    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    (mean, variance.max(0.0).sqrt())
}

impl ImageQualityGate for LuminanceGate {
    fn check(&self, image: &ImageInput) -> Result<(), String> {
        let decoded = image::load_from_memory(&image.bytes)
            .map_err(|e| format!("⚠️ Imagen no válida o formato no soportado ({e})"))?;
        let rgb = decoded.to_rgb8();
        let (mean, std) = channel_stats(&rgb);

        tracing::debug!(
            width = rgb.width(),
            height = rgb.height(),
            mean,
            std,
            "Image quality statistics"
        );

        if mean < MIN_MEAN {
            return Err("⚠️ Imagen demasiado oscura".into());
        }
        if mean > MAX_MEAN {
            return Err("⚠️ Imagen demasiado clara/sobreexpuesta".into());
        }
        if std < MIN_STD {
            return Err("⚠️ Imagen muy uniforme o corrupta (sin contraste)".into());
        }
        Ok(())
    }
}

/// Gate that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllGate;

impl ImageQualityGate for AcceptAllGate {
    fn check(&self, _image: &ImageInput) -> Result<(), String> {
        Ok(())
    }
}
