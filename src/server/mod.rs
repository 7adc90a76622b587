//! HTTP and websocket surface of the dashboard

pub mod dashboard;
pub mod websocket;

pub use dashboard::{DashboardServer, DashboardServerConfig, DashboardState};
pub use websocket::{serve_subscriber, WebSocketSink};
