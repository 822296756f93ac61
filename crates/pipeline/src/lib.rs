//! Failure detection and handling pipeline.
//!
//! - [`HealthMonitor`]: periodic producer that evaluates every device and
//!   appends an alert-raised event on each UP -> DOWN transition.
//! - [`AlertConsumer`]: cursor-driven consumer that turns each event into one
//!   alert and one ticket, idempotently.
//! - [`Store`]: the persistence boundary both loops share, with
//!   [`PgStore`] and [`MemoryStore`] implementations.
//! - [`HealthProbe`]: the pluggable per-device health predicate.

pub mod backoff;
pub mod consumer;
pub mod health;
pub mod memory;
pub mod monitor;
pub mod postgres;
pub mod store;

pub use consumer::{AlertConsumer, BatchReport, ConsumerConfig};
pub use health::{FnProbe, HealthProbe, RandomProbe};
pub use memory::MemoryStore;
pub use monitor::{CycleReport, HealthMonitor, MonitorConfig};
pub use postgres::PgStore;
pub use store::Store;
