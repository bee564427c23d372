//! Isolated conversion workers.
//!
//! Conversions run in separate OS processes so a crash, hang, or runaway
//! allocation in a converter cannot take down the service. The submodules
//! split along the process boundary: [`proto`] defines the framed wire
//! format, [`child`] is the loop that runs inside a worker process, and
//! [`pool`] manages the fleet from the service side.

pub mod child;
pub mod pool;
pub mod proto;

pub use pool::{PoolConfig, WorkerPool};
