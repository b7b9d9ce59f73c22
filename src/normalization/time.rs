//! Run-time codec shared by every feed.
//!
//! Upstream feeds report times as bare seconds (`"12.345"`), `m:ss.mmm`
//! (`"1:02.500"`) or `h:mm:ss.mmm` (`"1:02:03.456"`). Everything is stored as
//! seconds (`f64`) and rendered back with millisecond precision.

/// Sentinel returned by [`parse_time`] for text that is not a valid time.
pub const INVALID_TIME: f64 = -1.0;

/// Parse a time string into seconds, `None` when it matches none of the
/// accepted shapes or any component is negative / not a finite number.
///
/// No upper bound is applied to the leading component.
pub fn try_parse_time(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let mut total = 0.0_f64;
    let weights: &[f64] = match parts.len() {
        1 => &[1.0],
        2 => &[60.0, 1.0],
        3 => &[3600.0, 60.0, 1.0],
        _ => return None,
    };
    for (part, weight) in parts.iter().zip(weights) {
        total += parse_component(part)? * weight;
    }
    Some(total)
}

/// Sentinel form of [`try_parse_time`]: invalid input yields [`INVALID_TIME`].
pub fn parse_time(text: &str) -> f64 {
    try_parse_time(text).unwrap_or(INVALID_TIME)
}

fn parse_component(part: &str) -> Option<f64> {
    let part = part.trim();
    // f64::from_str accepts "inf", "NaN" and signs; none of those are times.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    let value = part.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Render seconds using the coarsest non-zero unit:
/// `h:mm:ss.mmm`, `m:ss.mmm` or `s.mmm`.
///
/// Rounds to whole milliseconds first so a value like `59.9996` becomes
/// `1:00.000` rather than `60.000`. Negative or non-finite input renders as
/// `0.000`.
pub fn format_seconds(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}.{millis:03}")
    } else if minutes > 0 {
        format!("{minutes}:{secs:02}.{millis:03}")
    } else {
        format!("{secs}.{millis:03}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn parses_three_shapes() {
        assert!(close(parse_time("12.345"), 12.345));
        assert!(close(parse_time("1:02.500"), 62.5));
        assert!(close(parse_time("1:02:03.456"), 3723.456));
        assert!(close(parse_time(" 45 "), 45.0));
    }

    #[test]
    fn rejects_garbage_with_sentinel() {
        assert_eq!(parse_time("abc"), INVALID_TIME);
        assert_eq!(parse_time(""), INVALID_TIME);
        assert_eq!(parse_time("1:2:3:4"), INVALID_TIME);
        assert_eq!(parse_time("1:"), INVALID_TIME);
        assert_eq!(parse_time("-5.0"), INVALID_TIME);
        assert_eq!(parse_time("1:-02.5"), INVALID_TIME);
        assert_eq!(parse_time("inf"), INVALID_TIME);
        assert_eq!(parse_time("NaN"), INVALID_TIME);
        assert_eq!(try_parse_time("1:xx.000"), None);
    }

    #[test]
    fn hours_are_unbounded() {
        assert!(close(parse_time("30:00:00.000"), 108_000.0));
    }

    #[test]
    fn formats_coarsest_unit() {
        assert_eq!(format_seconds(3723.456), "1:02:03.456");
        assert_eq!(format_seconds(62.5), "1:02.500");
        assert_eq!(format_seconds(12.345), "12.345");
        assert_eq!(format_seconds(5.0), "5.000");
        assert_eq!(format_seconds(3600.0), "1:00:00.000");
        assert_eq!(format_seconds(0.0), "0.000");
    }

    #[test]
    fn formatting_carries_rounded_millis() {
        assert_eq!(format_seconds(59.9996), "1:00.000");
        assert_eq!(format_seconds(-3.0), "0.000");
        assert_eq!(format_seconds(f64::NAN), "0.000");
    }

    #[test]
    fn format_then_parse_round_trips() {
        let samples = [
            0.001, 9.5, 12.345, 59.999, 60.0, 62.5, 599.123, 3599.999, 3600.0, 3723.456,
            86_399.5, 360_000.25,
        ];
        for s in samples {
            let rendered = format_seconds(s);
            let back = try_parse_time(&rendered)
                .unwrap_or_else(|| panic!("format_seconds({s}) produced unparsable {rendered}"));
            assert!((back - s).abs() < 0.0005, "{s} -> {rendered} -> {back}");
        }
    }

    #[test]
    fn parse_then_format_is_semantically_equal() {
        for text in ["12.345", "1:02.500", "1:02:03.456", "0:05.000", "00:01:00.000"] {
            let secs = parse_time(text);
            assert!(close(parse_time(&format_seconds(secs)), secs), "{text}");
        }
    }
}
