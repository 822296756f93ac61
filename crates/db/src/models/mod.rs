//! Row models and DTOs.

pub mod alert;
pub mod cursor;
pub mod device;
pub mod status;
pub mod stream;
pub mod ticket;
