//! Domain actors and stores used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Each actor owns its state outright (the hub owns the client registry, the
//! collector owns the log file) and is reached only through a cloneable
//! handle. Route handlers stay focused on protocol translation.

pub mod assets;
pub mod client;
pub mod collector;
pub mod hub;
