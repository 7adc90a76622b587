//! Demo producers
//!
//! Small background tasks that feed the dashboard document, each writing only
//! the field it was handed.

pub mod clients;
pub mod uptime;

pub use clients::{ClientsComponent, CLIENT_STATUSES};
pub use uptime::UptimeComponent;
