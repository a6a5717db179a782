//! WebSocket Lesson Sessions
//!
//! Each connection runs one lesson controller. It is structured into
//! submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `bridge`: Presents the browser's speech engines as the lesson's speech capabilities.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.

pub mod bridge;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
