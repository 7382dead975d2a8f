use image::imageops::FilterType;
use image::RgbaImage;

/// Length of one zoom phase window. Even windows push in, odd windows push
/// out, so the scale is continuous across window boundaries and returns to
/// baseline every `2 * PHASE_SECONDS`.
pub const PHASE_SECONDS: f64 = 2.0;

/// Maximum zoom magnitude. Keeps the crop inside the source resolution.
pub const MAX_ZOOM: f64 = 0.08;

/// Scale factor at absolute time `t`. Pure function: no counters, no state,
/// safely recomputable for the same `t`.
pub fn zoom_scale(t: f64) -> f64 {
    let window = (t / PHASE_SECONDS).floor() as i64;
    let progress = (t % PHASE_SECONDS) / PHASE_SECONDS;
    let pushing_in = window % 2 == 0;
    let magnitude = if pushing_in { progress } else { 1.0 - progress };
    1.0 + MAX_ZOOM * magnitude
}

/// Centered crop rectangle for a given scale: `(left, top, width, height)`.
pub fn crop_rect(frame_width: u32, frame_height: u32, scale: f64) -> (u32, u32, u32, u32) {
    let crop_w = ((f64::from(frame_width) / scale) as u32).max(1);
    let crop_h = ((f64::from(frame_height) / scale) as u32).max(1);
    let left = (frame_width - crop_w) / 2;
    let top = (frame_height - crop_h) / 2;
    (left, top, crop_w, crop_h)
}

/// Apply the zoom for time `t` to an RGBA frame, returning a new buffer of
/// the same dimensions. Crop is centered; the crop is resized back up with
/// Lanczos3. Apply before caption burning so caption geometry is undistorted.
pub fn apply_zoom(frame: &[u8], width: u32, height: u32, t: f64) -> Vec<u8> {
    let scale = zoom_scale(t);
    let (left, top, crop_w, crop_h) = crop_rect(width, height, scale);
    if crop_w == width && crop_h == height {
        return frame.to_vec();
    }

    let Some(image) = RgbaImage::from_raw(width, height, frame.to_vec()) else {
        // Buffer does not match the stated geometry; leave it untouched.
        return frame.to_vec();
    };
    let cropped = image::imageops::crop_imm(&image, left, top, crop_w, crop_h).to_image();
    image::imageops::resize(&cropped, width, height, FilterType::Lanczos3).into_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_baseline_at_cycle_boundaries() {
        assert!((zoom_scale(0.0) - 1.0).abs() < 1e-9);
        assert!((zoom_scale(2.0 * PHASE_SECONDS) - 1.0).abs() < 1e-9);
        assert!((zoom_scale(4.0 * PHASE_SECONDS) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scale_never_exceeds_max_zoom() {
        let mut t = 0.0;
        while t < 20.0 {
            let scale = zoom_scale(t);
            assert!(scale >= 1.0 - 1e-9, "scale {scale} below baseline at {t}");
            assert!(
                scale <= 1.0 + MAX_ZOOM + 1e-9,
                "scale {scale} above bound at {t}"
            );
            t += 0.01;
        }
    }

    #[test]
    fn scale_is_continuous_across_window_boundary() {
        // End of push-in meets start of push-out at full magnitude.
        let before = zoom_scale(PHASE_SECONDS - 1e-6);
        let after = zoom_scale(PHASE_SECONDS);
        assert!((before - after).abs() < 1e-3);
        assert!((after - (1.0 + MAX_ZOOM)).abs() < 1e-9);
    }

    #[test]
    fn crop_rect_is_centered_and_bounded() {
        let (left, top, w, h) = crop_rect(1920, 1080, 1.08);
        assert!(w <= 1920 && h <= 1080);
        assert_eq!(left, (1920 - w) / 2);
        assert_eq!(top, (1080 - h) / 2);
    }

    #[test]
    fn apply_zoom_is_idempotent_per_input() {
        let width = 32u32;
        let height = 24u32;
        let frame: Vec<u8> = (0..width * height * 4).map(|i| (i % 251) as u8).collect();
        let first = apply_zoom(&frame, width, height, 1.3);
        let second = apply_zoom(&frame, width, height, 1.3);
        assert_eq!(first, second);
        assert_eq!(first.len(), frame.len());
    }

    #[test]
    fn apply_zoom_at_baseline_is_passthrough() {
        let width = 16u32;
        let height = 16u32;
        let frame: Vec<u8> = (0..width * height * 4).map(|i| (i % 253) as u8).collect();
        assert_eq!(apply_zoom(&frame, width, height, 0.0), frame);
    }
}
