use std::fmt::Write as _;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, value) in bytes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        let _ = write!(rendered, "{value:02X}");
    }
    rendered
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "-".to_string(), |value| value.to_string())
}

/// Formats advertised service UUIDs as a comma-separated list.
pub(crate) fn format_service_uuids(uuids: &[String]) -> String {
    if uuids.is_empty() {
        return "-".to_string();
    }
    uuids.join(", ")
}

/// Formats an error followed by each of its sources, separated by `: `.
pub(crate) fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(&[], "<empty>")]
    #[case::single(&[0x0A], "0A")]
    #[case::status_command(&[0x16, 0x03, 0x19], "16 03 19")]
    fn format_hex_renders_uppercase_pairs(#[case] bytes: &[u8], #[case] expected: &str) {
        assert_eq!(expected, format_hex(bytes));
    }

    #[test]
    fn format_rssi_handles_unknown() {
        assert_eq!("-", format_rssi(None));
        assert_eq!("-61", format_rssi(Some(-61)));
    }

    #[test]
    fn format_service_uuids_joins_values() {
        assert_eq!("-", format_service_uuids(&[]));
        assert_eq!(
            "a, b",
            format_service_uuids(&["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn format_error_chain_appends_sources() {
        let source = "x".parse::<i16>().expect_err("`x` is not a number");
        let error = crate::error::FixtureError::InvalidRssi(source);
        assert_eq!(
            "failed to parse RSSI value: invalid digit found in string",
            format_error_chain(&error)
        );
    }
}
