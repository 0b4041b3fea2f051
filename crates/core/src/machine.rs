//! Machine lifecycle status and naming rules.
//!
//! Status strings are stored verbatim in `machines.status` and sent to
//! viewers in `init` / `status` stream messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Line appended to every machine that was mid-provisioning when the
/// process restarted.
pub const INTERRUPTED_LINE: &str = "Provisioning interrupted by server restart";

/// Output substring that signals the provider-injected default key was
/// revoked on the machine.
///
/// This couples machine state to free-form tool output. It is kept for
/// compatibility with the existing playbook; a structured signal would be
/// preferable.
pub const DEFAULT_KEY_REMOVED_MARKER: &str = "Hetzner provisioning key removed";

/// Prefix for generated machine names.
pub const GENERATED_NAME_PREFIX: &str = "claw-";

/// Maximum length of a machine name (provider hostname limit).
const MAX_NAME_LEN: usize = 63;

// ---------------------------------------------------------------------------
// MachineStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a machine.
///
/// `Provisioning` moves to exactly one of the terminal states per pipeline
/// run. Only a reprovision moves a terminal machine back to `Provisioning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Provisioning,
    Ready,
    Failed,
}

impl MachineStatus {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// `ready` and `failed` see no further automatic transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(Self::Provisioning),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown machine status '{other}'"
            ))),
        }
    }
}

/// Check that a machine in `status` may be reprovisioned.
pub fn ensure_can_reprovision(status: MachineStatus) -> Result<(), CoreError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Machine is currently {status}; wait for the running pipeline to finish"
        )))
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Generate a random machine name such as `claw-1a2b3c4d`.
pub fn random_name() -> String {
    let bytes: [u8; 4] = rand::random();
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{GENERATED_NAME_PREFIX}{suffix}")
}

/// Validate a user-supplied machine name.
///
/// Names become provider hostnames, so only ASCII alphanumerics and `-` are
/// accepted and the name may not start or end with `-`.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("Machine name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Machine name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CoreError::Validation(
            "Machine name may only contain letters, digits and '-'".into(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(CoreError::Validation(
            "Machine name must not start or end with '-'".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            MachineStatus::Provisioning,
            MachineStatus::Ready,
            MachineStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<MachineStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_matches!(
            "booting".parse::<MachineStatus>(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn only_ready_and_failed_are_terminal() {
        assert!(!MachineStatus::Provisioning.is_terminal());
        assert!(MachineStatus::Ready.is_terminal());
        assert!(MachineStatus::Failed.is_terminal());
    }

    #[test]
    fn reprovision_rejected_while_provisioning() {
        assert_matches!(
            ensure_can_reprovision(MachineStatus::Provisioning),
            Err(CoreError::Conflict(_))
        );
        assert!(ensure_can_reprovision(MachineStatus::Failed).is_ok());
        assert!(ensure_can_reprovision(MachineStatus::Ready).is_ok());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&MachineStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
    }

    #[test]
    fn random_name_has_prefix_and_hex_suffix() {
        let name = random_name();
        assert!(name.starts_with(GENERATED_NAME_PREFIX));
        let suffix = &name[GENERATED_NAME_PREFIX.len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(validate_name(&name).is_ok());
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("trailing-").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
        assert!(validate_name("node-01").is_ok());
    }
}
