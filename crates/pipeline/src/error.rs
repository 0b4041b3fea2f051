//! Error types for pipeline steps and the store seam.

/// A fatal pipeline step failure. Every variant ends the run in `failed`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The management port never accepted a connection.
    #[error("SSH not reachable after {attempts} attempts at {address}")]
    Timeout { address: String, attempts: u32 },

    /// The configuration tool exited unsuccessfully. `output` holds the
    /// complete un-redacted transcript for diagnostics and is never shown
    /// to viewers.
    #[error("configuration tool exited with {}", describe_exit(*exit_code))]
    ConfigurationFailed {
        exit_code: Option<i32>,
        output: String,
    },

    /// The configuration tool could not be started or awaited.
    #[error("failed to run configuration tool: {0}")]
    Launch(#[source] std::io::Error),

    /// The temporary inventory could not be written.
    #[error("failed to write inventory: {0}")]
    Inventory(#[source] std::io::Error),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "termination by signal".to_string(),
    }
}

/// Log store failure. Inside a run these are logged and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage write failed ({operation}): {message}")]
    StorageWriteFailed {
        operation: &'static str,
        message: String,
    },

    #[error("storage read failed ({operation}): {message}")]
    StorageReadFailed {
        operation: &'static str,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
