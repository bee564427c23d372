//! HTTP surface for the conversion service.
//!
//! Provides the REST API: document upload and conversion, health checks,
//! supported-format discovery, and conversion statistics.
//!
//! # Usage
//!
//! ```bash
//! docmark serve --port 8000
//! curl -F "file=@report.pdf" http://127.0.0.1:8000/api/v1/convert
//! ```

pub mod routes;
mod server;

pub use routes::AppState;
pub use server::{ServerConfig, WebServer};
