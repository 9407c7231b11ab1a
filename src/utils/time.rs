//! Time parsing and formatting utilities

use crate::error::{FramecutError, FramecutResult};

/// Parse `seconds`, `MM:SS[.ms]` or `HH:MM:SS[.ms]` into seconds
pub fn parse_time(time_str: &str) -> FramecutResult<f64> {
    let trimmed = time_str.trim();
    let invalid = || {
        FramecutError::invalid(format!(
            "invalid time '{}': expected seconds, MM:SS.ms or HH:MM:SS.ms",
            trimmed
        ))
    };

    let parts: Vec<&str> = trimmed.split(':').collect();
    let seconds = match parts.as_slice() {
        [secs] => secs.parse::<f64>().map_err(|_| invalid())?,
        [minutes, secs] => {
            let minutes = minutes.parse::<u32>().map_err(|_| invalid())?;
            let secs = parse_seconds_field(secs).ok_or_else(invalid)?;
            minutes as f64 * 60.0 + secs
        }
        [hours, minutes, secs] => {
            let hours = hours.parse::<u32>().map_err(|_| invalid())?;
            let minutes = minutes.parse::<u32>().map_err(|_| invalid())?;
            if minutes >= 60 {
                return Err(invalid());
            }
            let secs = parse_seconds_field(secs).ok_or_else(invalid)?;
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + secs
        }
        _ => return Err(invalid()),
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }
    Ok(seconds)
}

fn parse_seconds_field(field: &str) -> Option<f64> {
    let secs = field.parse::<f64>().ok()?;
    (0.0..60.0).contains(&secs).then_some(secs)
}

/// Format seconds as `MM:SS.mmm`, or `HH:MM:SS.mmm` past one hour
pub fn format_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, secs, millis)
    }
}

/// Compact seconds for file names: `2s`, `2.5s`, `61.125s`
pub fn format_for_filename(seconds: f64) -> String {
    let formatted = format!("{:.3}", seconds.max(0.0));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{}s", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_time("123.45").unwrap(), 123.45);
        assert_eq!(parse_time(" 2 ").unwrap(), 2.0);
    }

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(parse_time("01:30.5").unwrap(), 90.5);
        assert_eq!(parse_time("1:02:03.5").unwrap(), 3723.5);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_time("abc").is_err());
        assert!(parse_time("-1").is_err());
        assert!(parse_time("00:60").is_err());
        assert!(parse_time("1:60:00").is_err());
        assert!(parse_time("1:2:3:4").is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(90.5), "01:30.500");
        assert_eq!(format_time(3723.456), "01:02:03.456");
    }

    #[test]
    fn test_format_for_filename() {
        assert_eq!(format_for_filename(2.0), "2s");
        assert_eq!(format_for_filename(2.5), "2.5s");
        assert_eq!(format_for_filename(0.0), "0s");
        assert_eq!(format_for_filename(1.23456), "1.235s");
    }
}
