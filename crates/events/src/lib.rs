//! Append-only event stream used between failure detection and failure
//! handling.
//!
//! - [`EventStream`]: the append / blocking-read contract.
//! - [`MemoryStream`]: in-process implementation, woken with
//!   `tokio::sync::Notify`.
//! - [`PgEventStream`]: durable implementation over the `stream_entries`
//!   table, woken with Postgres `LISTEN/NOTIFY`.

pub mod memory;
pub mod postgres;
pub mod stream;

pub use fleetwatch_db::models::stream::StreamEntry;
pub use memory::MemoryStream;
pub use postgres::PgEventStream;
pub use stream::EventStream;
