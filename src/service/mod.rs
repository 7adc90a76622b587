//! Service layer for the matchboard dashboard
//!
//! This module contains the main application state, component wiring and
//! background task management for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
