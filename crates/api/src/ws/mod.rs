//! Live log streaming over WebSocket.
//!
//! `GET /api/v1/machines/{id}/ws` validates the machine before upgrading,
//! then hands the socket to a [`session`] that replays the stored log and
//! follows it live until the machine reaches a terminal status.

mod handler;
mod session;

pub use handler::log_stream_handler;
pub use session::KEEPALIVE_INTERVAL;
