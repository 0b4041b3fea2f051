//! Extraction of `MARKER=value` outputs from configuration-tool text.

/// Marker printed by the playbook once the node wallet has been derived.
pub const WALLET_ADDRESS_MARKER: &str = "WALLET_ADDRESS";

/// Find the first `marker=` occurrence in `output` and return the rest of
/// that line, trimmed of whitespace and wrapping quote characters.
///
/// Returns an empty string when the marker never appears.
pub fn extract_marker_value(output: &str, marker: &str) -> String {
    let needle = format!("{marker}=");
    output
        .lines()
        .find_map(|line| {
            line.find(&needle)
                .map(|idx| &line[idx + needle.len()..])
        })
        .map(|rest| rest.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .unwrap_or_default()
}

/// Convenience wrapper for [`WALLET_ADDRESS_MARKER`].
pub fn extract_wallet_address(output: &str) -> String {
    extract_marker_value(output, WALLET_ADDRESS_MARKER)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
