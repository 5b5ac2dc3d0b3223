//! HTTP bridge for a miIO robot vacuum.
//!
//! Translates a small REST surface into remote method calls against a
//! vacuum on the local network: a fixed command table, a lazily
//! initialized cached device connection, and a compact miIO protocol
//! client.

pub mod api;
pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod miio;
pub mod tracing;
