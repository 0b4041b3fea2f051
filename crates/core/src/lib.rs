//! Domain types and pure helpers shared by every creator crate.
//!
//! Nothing in here touches the database, the network, or child processes.

pub mod error;
pub mod extraction;
pub mod line_splitter;
pub mod machine;
pub mod provision;
pub mod redaction;
pub mod stream_messages;
pub mod types;
