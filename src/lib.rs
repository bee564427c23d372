//! docmark - document to markdown conversion service
//!
//! Converts office documents, PDFs, web pages, and media metadata into
//! clean markdown. The heavy lifting runs in isolated worker processes
//! managed by a fixed-capacity pool; the [`coordinator::Coordinator`]
//! ties validation, dispatch, and markdown cleanup together; [`web`]
//! exposes the whole thing over HTTP.

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod normalize;
pub mod stats;
pub mod types;
pub mod validate;
pub mod web;
pub mod worker;

pub use config::ServiceConfig;
pub use coordinator::Coordinator;
pub use error::{ConvertError, Result};
pub use stats::{MetricsCollector, NullSink, StatsSink};
pub use types::{ConversionRequest, ConversionResult, ConvertOptions};
pub use web::{ServerConfig, WebServer};
pub use worker::{PoolConfig, WorkerPool};
