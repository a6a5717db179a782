//! Drill API Library Crate
//!
//! WebSocket service that runs spoken math lessons for a browser. The browser
//! provides the speech engines and renders the lesson; this crate owns the
//! lesson itself. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod router;
pub mod state;
pub mod ws;
