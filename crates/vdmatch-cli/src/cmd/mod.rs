pub mod completions;
pub mod eval;
pub mod index;
pub mod match_cmd;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use vdmatch_core::config::ArbiterConfig;
use vdmatch_search::arbiter::GeminiArbiter;

/// Environment variable naming the catalog index file.
pub const INDEX_ENV: &str = "VDMATCH_INDEX";

/// Index file used when neither `--index` nor `$VDMATCH_INDEX` is given.
pub const DEFAULT_INDEX: &str = "vd_index.db";

/// `--index` flag shared by every command that touches the catalog.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexArg {
    /// Catalog index file [env: VDMATCH_INDEX] [default: vd_index.db].
    #[arg(long, short = 'i', value_name = "PATH")]
    pub index: Option<PathBuf>,
}

impl IndexArg {
    pub fn path(&self) -> PathBuf {
        resolve_index_path(self.index.as_deref(), std::env::var(INDEX_ENV).ok())
    }
}

fn resolve_index_path(flag: Option<&Path>, env_value: Option<String>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    env_value
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_INDEX), PathBuf::from)
}

/// Read a whole input file; `-` reads stdin.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Construct the configured arbiter, or `None` when it is disabled or has
/// no credentials. A missing key is logged, not fatal.
pub fn configured_arbiter(config: &ArbiterConfig, disabled: bool) -> Option<GeminiArbiter> {
    if disabled || !config.enabled {
        tracing::debug!("arbiter disabled");
        return None;
    }
    match GeminiArbiter::from_config(config) {
        Ok(arbiter) => Some(arbiter),
        Err(e) => {
            tracing::warn!(error = %e, "arbiter unavailable, continuing without it");
            None
        }
    }
}
