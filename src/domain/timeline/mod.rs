// Timeline mapping - playback time <-> thumbnail strip geometry

use crate::domain::model::Frame;

/// Horizontal cursor offset within a strip of `track_width_px` pixels.
///
/// Returns 0 for a zero, negative or non-finite duration.
pub fn position_to_offset(current_time: f64, duration: f64, track_width_px: f64) -> f64 {
    if !duration.is_finite() || duration <= 0.0 || !current_time.is_finite() {
        return 0.0;
    }
    let width = track_width_px.max(0.0);
    (current_time / duration).clamp(0.0, 1.0) * width
}

/// Seek target for a click on a rendered frame: the frame's own time,
/// not the click's pixel position.
pub fn frame_click_to_seek_time(frame: &Frame) -> f64 {
    frame.time()
}

/// Scroll position that keeps `offset_px` centered in a viewport of
/// `viewport_px` over a track of `track_px`, clamped to the scrollable range.
pub fn scroll_to_reveal(offset_px: f64, viewport_px: f64, track_px: f64) -> f64 {
    let max_scroll = (track_px - viewport_px).max(0.0);
    if max_scroll == 0.0 || !offset_px.is_finite() {
        return 0.0;
    }
    (offset_px - viewport_px / 2.0).clamp(0.0, max_scroll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FrameImage;

    #[test]
    fn test_offset_stays_within_track() {
        let duration = 20.0;
        let width = 640.0;
        for step in 0..=200 {
            let t = duration * step as f64 / 200.0;
            let offset = position_to_offset(t, duration, width);
            assert!((0.0..=width).contains(&offset), "t={} offset={}", t, offset);
        }
        assert_eq!(position_to_offset(0.0, duration, width), 0.0);
        assert_eq!(position_to_offset(duration, duration, width), width);
        assert_eq!(position_to_offset(5.0, duration, width), 160.0);
    }

    #[test]
    fn test_offset_zero_duration() {
        for width in [0.0, 1.0, 480.0] {
            assert_eq!(position_to_offset(0.0, 0.0, width), 0.0);
            assert_eq!(position_to_offset(3.0, 0.0, width), 0.0);
        }
    }

    #[test]
    fn test_offset_clamps_out_of_range_time() {
        assert_eq!(position_to_offset(-1.0, 10.0, 100.0), 0.0);
        assert_eq!(position_to_offset(12.0, 10.0, 100.0), 100.0);
        assert_eq!(position_to_offset(f64::NAN, 10.0, 100.0), 0.0);
    }

    #[test]
    fn test_frame_click_is_identity() {
        let frame = Frame::new(7.25, FrameImage::new(80, 45, vec![0u8]));
        assert_eq!(frame_click_to_seek_time(&frame), 7.25);
    }

    #[test]
    fn test_scroll_to_reveal() {
        // Track fits in viewport: nothing to scroll
        assert_eq!(scroll_to_reveal(50.0, 400.0, 300.0), 0.0);
        // Centered while in the middle
        assert_eq!(scroll_to_reveal(500.0, 200.0, 1000.0), 400.0);
        // Clamped at both ends
        assert_eq!(scroll_to_reveal(20.0, 200.0, 1000.0), 0.0);
        assert_eq!(scroll_to_reveal(990.0, 200.0, 1000.0), 800.0);
    }
}
