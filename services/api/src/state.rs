//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources
//! shared by every connection.

use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}
