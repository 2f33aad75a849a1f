//! Darshan temple visit server
//!
//! Slot booking with a race-free capacity ledger, cancellation, and a crowd
//! simulation that raises overcrowding alerts and streams live temple status.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
