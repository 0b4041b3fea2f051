//! Secret masking for configuration-tool output.
//!
//! Applied to every line before it is stored or shown to a viewer. The
//! un-redacted text is still used for output extraction.

/// Appended after the visible prefix of a masked secret.
pub const MASK: &str = "***";

/// Number of leading characters of a secret left visible.
const VISIBLE_PREFIX_CHARS: usize = 3;

/// Replaces occurrences of known secret values in text.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    /// `(secret, replacement)` pairs, longest secret first so a secret that
    /// contains another is masked as a whole.
    replacements: Vec<(String, String)>,
}

impl SecretRedactor {
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut replacements: Vec<(String, String)> = secrets
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| {
                let prefix: String = s.chars().take(VISIBLE_PREFIX_CHARS).collect();
                let masked = format!("{prefix}{MASK}");
                (s, masked)
            })
            .collect();
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        replacements.dedup_by(|a, b| a.0 == b.0);
        Self { replacements }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Return `line` with every secret replaced by its masked form.
    pub fn redact(&self, line: &str) -> String {
        let mut out = line.to_string();
        for (secret, masked) in &self.replacements {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), masked);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
