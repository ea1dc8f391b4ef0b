#![forbid(unsafe_code)]
//! vdmatch-search library: candidate retrieval, fusion and arbitration.
//!
//! [`pipeline::match_citation`] is the entry point. It plans the citation,
//! runs the four [`strategy`] modules against a read-only catalog
//! connection, merges their output with [`fusion::fuse`] and optionally lets
//! an [`arbiter::Arbiter`] promote one candidate.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for index failures; [`arbiter::ArbiterError`]
//!   never leaves the arbiter adapter.
//! - **Logging**: `tracing` macros; per-strategy counts at `debug!`, the
//!   per-citation summary at `info!`.

pub mod arbiter;
pub mod candidate;
pub mod fusion;
pub mod pipeline;
pub mod planner;
pub mod similarity;
pub mod strategy;

pub use candidate::{Candidate, Origin, StrategyKind};
pub use pipeline::{MatchOutcome, match_citation};
