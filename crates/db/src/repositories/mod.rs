//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod alert_repo;
pub mod cursor_repo;
pub mod device_repo;
pub mod stream_repo;
pub mod ticket_repo;

pub use alert_repo::AlertRepo;
pub use cursor_repo::CursorRepo;
pub use device_repo::DeviceRepo;
pub use stream_repo::StreamRepo;
pub use ticket_repo::TicketRepo;
