//! Session gateway: opens and closes compute sessions, fans resource
//! operations out to every registered backend service, and bridges session
//! parameter reads and writes to the primary backend.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod params;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod telemetry;
