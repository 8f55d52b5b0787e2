//! Human duration strings.
//!
//! Accepted input forms: `90s`, `1:30`, `1m 30s`, `1m30s`, `2m`, or a bare
//! integer number of seconds. Anything else reads as zero.

/// Parse a human duration into whole seconds.
///
/// Unrecognized input yields `0` rather than an error.
pub fn parse_duration(text: &str) -> u32 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    if let Ok(seconds) = text.parse::<u32>() {
        return seconds;
    }

    if let Some((minutes, seconds)) = text.split_once(':') {
        return match (minutes.trim().parse::<u32>(), seconds.trim().parse::<u32>()) {
            (Ok(m), Ok(s)) => minutes_and_seconds(m, s),
            _ => 0,
        };
    }

    if let Some((minutes, rest)) = text.split_once('m') {
        let Ok(m) = minutes.trim().parse::<u32>() else {
            return 0;
        };
        let rest = rest.trim();
        if rest.is_empty() {
            return minutes_and_seconds(m, 0);
        }
        return match rest.strip_suffix('s').map(|s| s.trim().parse::<u32>()) {
            Some(Ok(s)) => minutes_and_seconds(m, s),
            _ => 0,
        };
    }

    text.strip_suffix('s')
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Out-of-range totals read as zero, like any other unrecognized input.
fn minutes_and_seconds(minutes: u32, seconds: u32) -> u32 {
    minutes
        .checked_mul(60)
        .and_then(|v| v.checked_add(seconds))
        .unwrap_or(0)
}

/// Format seconds as `Ns`, `Mm` or `Mm Ss`, omitting a zero component.
pub fn format_human(seconds: u32) -> String {
    let minutes = seconds / 60;
    let rest = seconds % 60;
    match (minutes, rest) {
        (0, s) => format!("{}s", s),
        (m, 0) => format!("{}m", m),
        (m, s) => format!("{}m {}s", m, s),
    }
}

/// Clock-style rendering for live timers: `M:SS`, or `H:MM:SS` past an hour.
pub fn format_clock(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepted_forms() {
        assert_eq!(parse_duration("90s"), 90);
        assert_eq!(parse_duration("1:30"), 90);
        assert_eq!(parse_duration("1m 30s"), 90);
        assert_eq!(parse_duration("1m30s"), 90);
        assert_eq!(parse_duration("2m"), 120);
        assert_eq!(parse_duration("45"), 45);
        assert_eq!(parse_duration("  60s "), 60);
    }

    #[test]
    fn test_parse_unrecognized_is_zero() {
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("soon"), 0);
        assert_eq!(parse_duration("1.5m"), 0);
        assert_eq!(parse_duration("m30s"), 0);
        assert_eq!(parse_duration("1:xx"), 0);
    }

    #[test]
    fn test_parse_overflow_is_zero() {
        assert_eq!(parse_duration("99999999m"), 0);
        assert_eq!(parse_duration("99999999m 30s"), 0);
        assert_eq!(parse_duration("99999999:00"), 0);
        assert_eq!(parse_duration("71582788m 15s"), u32::MAX);
        assert_eq!(parse_duration("71582788m 16s"), 0);
        assert_eq!(parse_duration("71582788m"), 4_294_967_280);
        assert_eq!(parse_duration("99999999999s"), 0);
    }

    #[test]
    fn test_format_omits_zero_component() {
        assert_eq!(format_human(0), "0s");
        assert_eq!(format_human(45), "45s");
        assert_eq!(format_human(120), "2m");
        assert_eq!(format_human(95), "1m 35s");
    }

    #[test]
    fn test_format_then_parse_is_identity() {
        for n in (0..4000).chain([86_399, 100_000]) {
            assert_eq!(parse_duration(&format_human(n)), n, "value {}", n);
        }
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(5), "0:05");
        assert_eq!(format_clock(95), "1:35");
        assert_eq!(format_clock(3725), "1:02:05");
    }
}
