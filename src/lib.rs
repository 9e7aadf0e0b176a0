//! Labtrack laboratory inventory server
//!
//! Keeps per-item impact counters (borrowed, maintenance, calibration,
//! disposal) consistent with the borrowing, return and disposal records that
//! reference them, and serves the workflow as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod circulation;
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
