//! `vdm eval` — hit rate of the pipeline over a labeled test set.
//!
//! Two input shapes are accepted:
//!
//! - a JSON array of `{"query": {...}, "expected": "VD18 10225986"}`;
//! - the annotation export, where each entry carries
//!   `json_representation.item.bibl` (object or list) and `"VD18 request"`
//!   (object or list with `VD18_ID`), zipped pairwise.
//!
//! A case is a hit when its target is among the first `--top` final
//! candidates. Cases whose label has no parseable identifier are skipped and
//! not counted. A per-case pipeline error counts as a miss.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use vdmatch_core::config::MatchConfig;
use vdmatch_core::db::open_catalog;
use vdmatch_core::error::ErrorCode;
use vdmatch_core::model::CitationQuery;
use vdmatch_core::normalize::ground_truth_identifier;
use vdmatch_search::arbiter::Arbiter;
use vdmatch_search::{StrategyKind, match_citation};

use super::{IndexArg, configured_arbiter, read_input};
use crate::output::{OutputMode, coded, pretty_rule, render_mode, truncate};

/// Arguments for `vdm eval`.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Labeled test set (JSON, `-` for stdin).
    #[arg(value_name = "TEST_SET")]
    pub test_set: PathBuf,

    /// Count a hit when the target is within the first N candidates.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Worker threads (default: all cores).
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Evaluate only the first N cases.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Skip the arbiter even when it is configured.
    #[arg(long)]
    pub no_arbiter: bool,

    #[command(flatten)]
    pub index: IndexArg,
}

/// One labeled citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalCase {
    pub query: CitationQuery,
    /// Ground-truth label as written in the test set.
    pub expected: String,
}

/// Outcome of one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub hit: bool,
    pub query: String,
    pub expected: String,
    pub target: String,
    pub primary_top: Option<String>,
    pub rare_term_top: Option<String>,
    pub arbiter_pick: Option<String>,
    pub final_top: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for `vdm eval`.
#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub top: usize,
    pub total: usize,
    pub found: usize,
    pub skipped: usize,
    pub hit_rate: f64,
    pub cases: Vec<CaseReport>,
}

// ---------------------------------------------------------------------------
// Test-set parsing
// ---------------------------------------------------------------------------

/// Parse either test-set shape.
///
/// # Errors
///
/// Returns an error if the document is not a JSON array.
pub fn parse_cases(document: &Value) -> Result<Vec<EvalCase>> {
    let entries = document
        .as_array()
        .context("test set must be a JSON array")?;

    let mut cases = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.get("query").is_some() {
            match native_case(entry) {
                Some(case) => cases.push(case),
                None => tracing::warn!(entry = i, "skipping unreadable test case"),
            }
        } else if entry.get("json_representation").is_some() {
            cases.extend(export_cases(entry));
        } else {
            tracing::warn!(entry = i, "test case has neither `query` nor `json_representation`");
        }
    }
    Ok(cases)
}

fn native_case(entry: &Value) -> Option<EvalCase> {
    let query: CitationQuery = serde_json::from_value(entry.get("query")?.clone()).ok()?;
    Some(EvalCase {
        query,
        expected: label_text(entry.get("expected")?),
    })
}

fn export_cases(entry: &Value) -> Vec<EvalCase> {
    let bibl = entry
        .pointer("/json_representation/item/bibl")
        .map(one_or_many)
        .unwrap_or_default();
    let labels = entry.get("VD18 request").map(one_or_many).unwrap_or_default();

    bibl.into_iter()
        .zip(labels)
        .filter_map(|(item, label)| {
            let query: CitationQuery = serde_json::from_value(item.clone()).ok()?;
            Some(EvalCase {
                query,
                expected: label.get("VD18_ID").map(label_text).unwrap_or_default(),
            })
        })
        .collect()
}

fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let text = read_input(path).map_err(|e| coded(ErrorCode::TestSetUnreadable, e))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("parse test set {}", path.display()))
        .map_err(|e| coded(ErrorCode::TestSetUnreadable, e))?;
    parse_cases(&document).map_err(|e| coded(ErrorCode::TestSetUnreadable, e))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn evaluate_case(
    conn: Option<&Connection>,
    case: &EvalCase,
    target: String,
    config: &MatchConfig,
    arbiter: Option<&dyn Arbiter>,
    top: usize,
) -> CaseReport {
    let mut report = CaseReport {
        hit: false,
        query: case.query.combined_text(),
        expected: case.expected.clone(),
        target,
        primary_top: None,
        rare_term_top: None,
        arbiter_pick: None,
        final_top: None,
        error: None,
    };

    let Some(conn) = conn else {
        report.error = Some("worker has no catalog connection".to_string());
        return report;
    };

    match match_citation(conn, &case.query, config, arbiter) {
        Ok(outcome) => {
            report.hit = outcome.hit_at(&report.target, top);
            report.primary_top = outcome.top_of(StrategyKind::Primary).map(|c| c.identifier.clone());
            report.rare_term_top = outcome.top_of(StrategyKind::RareTerm).map(|c| c.identifier.clone());
            report.final_top = outcome.top().map(|c| c.identifier.clone());
            report.arbiter_pick = outcome.arbiter_pick;
        }
        Err(e) => {
            tracing::warn!(query = %report.query, error = %format!("{e:#}"), "case failed, counted as miss");
            report.error = Some(format!("{e:#}"));
        }
    }
    report
}

/// Run every case and aggregate the hit rate.
///
/// Each rayon worker opens its own read-only connection to `index`.
///
/// # Errors
///
/// Returns an error if the index cannot be opened up front.
pub fn evaluate(
    index: &Path,
    cases: &[EvalCase],
    config: &MatchConfig,
    arbiter: Option<&dyn Arbiter>,
    top: usize,
) -> Result<EvalReport> {
    // Fail fast on a missing or empty index before spawning workers.
    drop(open_catalog(index)?);

    let labeled: Vec<(&EvalCase, String)> = cases
        .iter()
        .map(|case| (case, ground_truth_identifier(&case.expected)))
        .collect();
    let skipped = labeled.iter().filter(|(_, target)| target.is_empty()).count();

    let reports: Vec<CaseReport> = labeled
        .into_par_iter()
        .filter(|(_, target)| !target.is_empty())
        .map_init(
            || match open_catalog(index) {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "worker could not open catalog");
                    None
                }
            },
            |conn, (case, target)| evaluate_case(conn.as_ref(), case, target, config, arbiter, top),
        )
        .collect();

    let found = reports.iter().filter(|r| r.hit).count();
    let total = reports.len();
    #[allow(clippy::cast_precision_loss)]
    let hit_rate = if total == 0 { 0.0 } else { found as f64 / total as f64 };
    tracing::info!(total, found, skipped, hit_rate, "evaluation complete");

    Ok(EvalReport {
        top,
        total,
        found,
        skipped,
        hit_rate,
        cases: reports,
    })
}

/// Execute `vdm eval`.
pub fn run_eval(args: &EvalArgs, config: &MatchConfig, output: OutputMode) -> Result<()> {
    let mut cases = load_cases(&args.test_set)?;
    if let Some(limit) = args.limit {
        cases.truncate(limit);
    }

    let arbiter = configured_arbiter(&config.arbiter, args.no_arbiter);
    let arbiter_ref = arbiter.as_ref().map(|a| a as &dyn Arbiter);
    let index = args.index.path();

    let report = match args.jobs {
        Some(jobs) => rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("build evaluation thread pool")?
            .install(|| evaluate(&index, &cases, config, arbiter_ref, args.top))?,
        None => evaluate(&index, &cases, config, arbiter_ref, args.top)?,
    };

    render_mode(output, &report, render_text, render_pretty)
}

fn or_dash(value: Option<&String>) -> &str {
    value.map_or("-", String::as_str)
}

fn render_text(report: &EvalReport, w: &mut dyn Write) -> std::io::Result<()> {
    for case in &report.cases {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            if case.hit { "HIT" } else { "MISS" },
            case.target,
            or_dash(case.primary_top.as_ref()),
            or_dash(case.rare_term_top.as_ref()),
            or_dash(case.arbiter_pick.as_ref()),
            or_dash(case.final_top.as_ref()),
            case.query,
        )?;
    }
    writeln!(w, "score\t{}/{}\tskipped={}", report.found, report.total, report.skipped)
}

fn render_pretty(report: &EvalReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "{:<6} | {:<30} | {:<15} | {:<12} | {:<12} | {:<12} | FINAL",
        "STATUS", "QUERY", "TARGET", "PRIMARY", "RARE_TERM", "ARBITER"
    )?;
    pretty_rule(w)?;
    for case in &report.cases {
        writeln!(
            w,
            "{:<6} | {:<30} | {:<15} | {:<12} | {:<12} | {:<12} | {}",
            if case.hit { "✓" } else { "✗" },
            truncate(&case.query, 30),
            truncate(&case.expected.replace(' ', ""), 15),
            truncate(or_dash(case.primary_top.as_ref()), 12),
            truncate(or_dash(case.rare_term_top.as_ref()), 12),
            truncate(or_dash(case.arbiter_pick.as_ref()), 12),
            or_dash(case.final_top.as_ref()),
        )?;
    }
    writeln!(w)?;
    writeln!(
        w,
        "Score: {}/{} ({:.1}% in top {}), {} skipped",
        report.found,
        report.total,
        report.hit_rate * 100.0,
        report.top,
        report.skipped
    )
}
