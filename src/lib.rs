//! # modhelper-rs
//!
//! Marshals work from arbitrary threads onto a game host's main thread and
//! spawns game objects from string-identified templates.
//!
//! Provides a main-thread dispatcher, a spawn request façade, a TOML spawn
//! catalog, a C ABI call surface, and OpenTelemetry observability.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod host;
pub mod model;
pub mod spawn;
pub mod telemetry;
