//! `vdm match` — resolve one citation.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::db::open_catalog;
use vdmatch_core::error::ErrorCode;
use vdmatch_core::model::CitationQuery;
use vdmatch_search::arbiter::Arbiter;
use vdmatch_search::{Candidate, StrategyKind, match_citation};

use super::{IndexArg, configured_arbiter, read_input};
use crate::output::{OutputMode, coded, pretty_kv, pretty_rule, pretty_section, render_mode, truncate};

/// Arguments for `vdm match`.
#[derive(Args, Debug, Default)]
pub struct MatchArgs {
    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub year: Option<String>,

    #[arg(long)]
    pub place: Option<String>,

    /// Read the citation as a JSON object from FILE (`-` for stdin).
    #[arg(long, value_name = "FILE", conflicts_with_all = ["author", "title", "year", "place"])]
    pub input: Option<PathBuf>,

    /// Number of candidates to show.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,

    /// Skip the arbiter even when it is configured.
    #[arg(long)]
    pub no_arbiter: bool,

    #[command(flatten)]
    pub index: IndexArg,
}

#[derive(Debug, Serialize)]
struct StrategyCount {
    strategy: StrategyKind,
    accepted: usize,
}

/// Payload for `vdm match`.
#[derive(Debug, Serialize)]
struct MatchReport {
    query: CitationQuery,
    candidates: Vec<Candidate>,
    total_candidates: usize,
    strategies: Vec<StrategyCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arbiter_pick: Option<String>,
}

fn citation_from_args(args: &MatchArgs) -> Result<CitationQuery> {
    let query = match &args.input {
        Some(path) => {
            let text = read_input(path)?;
            serde_json::from_str(&text)
                .with_context(|| format!("parse citation JSON from {}", path.display()))?
        }
        None => CitationQuery {
            author: args.author.clone(),
            title: args.title.clone(),
            year: args.year.clone(),
            place: args.place.clone(),
        },
    };
    if query.is_blank() {
        return Err(coded(ErrorCode::EmptyQuery, anyhow::anyhow!("citation has no text")));
    }
    Ok(query)
}

/// Execute `vdm match`.
pub fn run_match(args: &MatchArgs, config: &MatchConfig, output: OutputMode) -> Result<()> {
    let query = citation_from_args(args)?;
    let conn = open_catalog(&args.index.path())?;
    let arbiter = configured_arbiter(&config.arbiter, args.no_arbiter);

    let outcome = match_citation(&conn, &query, config, arbiter.as_ref().map(|a| a as &dyn Arbiter))?;

    let report = MatchReport {
        query,
        total_candidates: outcome.candidates.len(),
        strategies: outcome
            .strategy_runs
            .iter()
            .map(|run| StrategyCount {
                strategy: run.strategy,
                accepted: run.candidates.len(),
            })
            .collect(),
        candidates: outcome.candidates.into_iter().take(args.limit).collect(),
        arbiter_pick: outcome.arbiter_pick,
    };

    render_mode(output, &report, render_text, render_pretty)
}

fn render_text(report: &MatchReport, w: &mut dyn Write) -> std::io::Result<()> {
    for (rank, c) in report.candidates.iter().enumerate() {
        writeln!(w, "{}\t{}\t{:.1}\t{}", rank + 1, c.identifier, c.score, c.origin)?;
    }
    Ok(())
}

fn render_pretty(report: &MatchReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Citation")?;
    for (key, value) in [
        ("Author", &report.query.author),
        ("Title", &report.query.title),
        ("Year", &report.query.year),
        ("Place", &report.query.place),
    ] {
        if let Some(value) = value {
            pretty_kv(w, key, value)?;
        }
    }
    let counts: Vec<String> = report
        .strategies
        .iter()
        .map(|s| format!("{}={}", s.strategy, s.accepted))
        .collect();
    pretty_kv(w, "Strategies", counts.join(" "))?;
    if let Some(pick) = &report.arbiter_pick {
        pretty_kv(w, "Arbiter", pick)?;
    }
    writeln!(w)?;

    if report.candidates.is_empty() {
        writeln!(w, "No candidates.")?;
        return Ok(());
    }

    writeln!(w, "{:>4}  {:<24}  {:>6}  ORIGIN", "#", "IDENTIFIER", "SCORE")?;
    pretty_rule(w)?;
    for (rank, c) in report.candidates.iter().enumerate() {
        writeln!(
            w,
            "{:>4}  {:<24}  {:>6.1}  {}",
            rank + 1,
            truncate(&c.identifier, 24),
            c.score,
            c.origin
        )?;
    }
    if report.total_candidates > report.candidates.len() {
        writeln!(w, "({} more)", report.total_candidates - report.candidates.len())?;
    }
    Ok(())
}
