#![forbid(unsafe_code)]
//! vdmatch-core library.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types; typed `thiserror`
//!   enums only where callers branch on the failure.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod normalize;
