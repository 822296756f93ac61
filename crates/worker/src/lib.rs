//! Process wiring for the fleetwatch worker: configuration and backend
//! selection. The binary in `main.rs` runs the health monitor and the alert
//! consumer side by side until it receives a shutdown signal.

pub mod config;
pub mod seed;
