use std::time::Duration;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| format!("{value:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "-".to_string(), |value| format!("{value} dBm"))
}

/// Formats the age of the last update, truncated to whole seconds.
pub(crate) fn format_age(age: Option<Duration>) -> String {
    age.map_or_else(
        || "never".to_string(),
        |age| {
            let whole = Duration::from_secs(age.as_secs());
            format!("{} ago", humantime::format_duration(whole))
        },
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("24 7C 27 40", format_hex(&[0x24, 0x7C, 0x27, 0x40]));
    }

    #[rstest]
    #[case(None, "-")]
    #[case(Some(-61), "-61 dBm")]
    fn format_rssi_renders_units(#[case] rssi: Option<i16>, #[case] expected: &str) {
        assert_eq!(expected, format_rssi(rssi));
    }

    #[rstest]
    #[case(None, "never")]
    #[case(Some(Duration::from_millis(2_750)), "2s ago")]
    #[case(Some(Duration::from_secs(0)), "0s ago")]
    #[case(Some(Duration::from_secs(75)), "1m 15s ago")]
    fn format_age_truncates_to_seconds(#[case] age: Option<Duration>, #[case] expected: &str) {
        assert_eq!(expected, format_age(age));
    }
}
