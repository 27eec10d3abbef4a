//! Musicat MARC21 music cataloging server
//!
//! REST JSON API for cataloging printed and manuscript music as MARC21
//! bibliographic records, with authority control, a public read-only catalog
//! and attached digitized scans.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod marc;
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
