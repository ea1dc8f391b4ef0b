//! `vdm index` — build and inspect the catalog index.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use vdmatch_core::db::build::{BuildStats, build_catalog, catalog_meta};
use vdmatch_core::db::fts::catalog_row_count;
use vdmatch_core::db::{open_catalog, open_catalog_for_build};
use vdmatch_core::error::ErrorCode;

use super::IndexArg;
use crate::output::{OutputMode, coded, pretty_kv, pretty_section, render_mode};

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    #[command(
        about = "Build the catalog index from a JSON-lines harvest",
        after_help = "EXAMPLES:\n    # Build from a harvest file\n    vdm index build --source vd18_harvest.jsonl\n\n    # Build from stdin into a custom path\n    zcat harvest.jsonl.gz | vdm index build --source - --index /data/vd.db"
    )]
    Build(BuildArgs),

    #[command(
        about = "Show catalog index statistics",
        after_help = "EXAMPLES:\n    vdm index stats --index /data/vd.db --format json"
    )]
    Stats(StatsArgs),
}

/// Arguments for `vdm index build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// JSON-lines harvest (`-` for stdin).
    #[arg(long, short = 's', value_name = "FILE")]
    pub source: PathBuf,

    #[command(flatten)]
    pub index: IndexArg,
}

/// Arguments for `vdm index stats`.
#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    #[command(flatten)]
    pub index: IndexArg,
}

#[derive(Debug, Serialize)]
struct BuildReport {
    index: String,
    #[serde(flatten)]
    stats: BuildStats,
}

/// Catalog summary for `vdm index stats`.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub index: String,
    pub file_bytes: u64,
    pub records: u64,
    pub schema_version: u32,
    pub built_at_secs: i64,
}

pub fn run_index(command: &IndexCommand, output: OutputMode) -> Result<()> {
    match command {
        IndexCommand::Build(args) => run_build(args, output),
        IndexCommand::Stats(args) => run_stats(args, output),
    }
}

fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let file = File::open(path)
        .with_context(|| format!("open harvest {}", path.display()))
        .map_err(|e| coded(ErrorCode::HarvestUnreadable, e))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Execute `vdm index build`.
pub fn run_build(args: &BuildArgs, output: OutputMode) -> Result<()> {
    let index = args.index.path();
    let reader = open_source(&args.source)?;
    let mut conn = open_catalog_for_build(&index)?;
    let stats = build_catalog(&mut conn, reader)
        .with_context(|| format!("build catalog index {}", index.display()))?;

    let report = BuildReport {
        index: index.display().to_string(),
        stats,
    };
    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\tread={}\tindexed={}\tskipped={}\tmalformed={}\telapsed_ms={}",
                r.index, r.stats.read, r.stats.indexed, r.stats.skipped, r.stats.malformed, r.stats.elapsed_ms
            )
        },
        |r, w| {
            pretty_section(w, "Catalog index built")?;
            pretty_kv(w, "Index", &r.index)?;
            pretty_kv(w, "Lines read", r.stats.read.to_string())?;
            pretty_kv(w, "Indexed", r.stats.indexed.to_string())?;
            pretty_kv(w, "Skipped", r.stats.skipped.to_string())?;
            pretty_kv(w, "Malformed", r.stats.malformed.to_string())?;
            pretty_kv(w, "Elapsed", format!("{} ms", r.stats.elapsed_ms))
        },
    )
}

/// Gather catalog statistics without rendering them.
pub fn collect_stats(index: &Path) -> Result<IndexStats> {
    let conn = open_catalog(index)?;
    let meta = catalog_meta(&conn)?;
    let records = catalog_row_count(&conn)?;
    let file_bytes = std::fs::metadata(index)
        .with_context(|| format!("stat {}", index.display()))?
        .len();
    Ok(IndexStats {
        index: index.display().to_string(),
        file_bytes,
        records,
        schema_version: meta.schema_version,
        built_at_secs: meta.built_at_secs,
    })
}

/// Execute `vdm index stats`.
pub fn run_stats(args: &StatsArgs, output: OutputMode) -> Result<()> {
    let stats = collect_stats(&args.index.path())?;
    render_mode(
        output,
        &stats,
        |s, w| {
            writeln!(w, "index\t{}", s.index)?;
            writeln!(w, "records\t{}", s.records)?;
            writeln!(w, "file_bytes\t{}", s.file_bytes)?;
            writeln!(w, "schema_version\t{}", s.schema_version)?;
            writeln!(w, "built_at_secs\t{}", s.built_at_secs)
        },
        |s, w| {
            pretty_section(w, "Catalog index")?;
            pretty_kv(w, "Index", &s.index)?;
            pretty_kv(w, "Records", s.records.to_string())?;
            pretty_kv(w, "File size", format!("{} bytes", s.file_bytes))?;
            pretty_kv(w, "Schema", format!("v{}", s.schema_version))?;
            pretty_kv(w, "Built at", format!("{} (unix)", s.built_at_secs))
        },
    )
}
