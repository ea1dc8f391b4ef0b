#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, coded, render_error, resolve_output_mode};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vdmatch_core::config::{MatchConfig, load_config};
use vdmatch_core::error::ErrorCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vdm: match bibliographic citations against the VD16/VD17/VD18 catalogs",
    long_about = None
)]
struct Cli {
    /// Config file (default: $VDMATCH_CONFIG, then <config_dir>/vdmatch/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Index",
        about = "Build or inspect the catalog index",
        subcommand_required = true
    )]
    Index {
        #[command(subcommand)]
        command: cmd::index::IndexCommand,
    },

    #[command(
        next_help_heading = "Match",
        about = "Match one citation",
        long_about = "Match one citation against the catalog and print the ranked candidates.",
        after_help = "EXAMPLES:\n    # Structured fields\n    vdm match --author \"Frölich\" --title \"De Peste\" --year 1680\n\n    # Citation JSON from stdin, no arbiter\n    echo '{\"title\": \"Eine neue Entrevue\"}' | vdm match --input - --no-arbiter\n\n    # Emit machine-readable output\n    vdm match --title \"De Peste\" --format json"
    )]
    Match(cmd::match_cmd::MatchArgs),

    #[command(
        next_help_heading = "Match",
        about = "Measure hit rate over a labeled test set",
        after_help = "EXAMPLES:\n    # Top-5 hit rate with 8 workers\n    vdm eval test_set.json --jobs 8\n\n    # Quick check on the first 20 cases without the arbiter\n    vdm eval test_set.json --limit 20 --no-arbiter"
    )]
    Eval(cmd::eval::EvalArgs),

    #[command(
        next_help_heading = "Shell",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    vdm completions bash > ~/.local/share/bash-completion/completions/vdm"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Filter used when `VDMATCH_LOG` is unset. Covers the binary (`vdm`) and
/// the library crates (`vdmatch_*`).
const fn default_log_directive(debug: bool) -> &'static str {
    if debug {
        "vdm=debug,vdmatch=debug,info"
    } else {
        "vdm=info,vdmatch=info,warn"
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VDMATCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_log_directive(env::var("DEBUG").is_ok())));

    let format = env::var("VDMATCH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn config_for(cli: &Cli) -> anyhow::Result<MatchConfig> {
    load_config(cli.config.as_deref()).map_err(|e| coded(ErrorCode::ConfigParseError, e))
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Index { command } => cmd::index::run_index(command, output),
        Commands::Match(args) => cmd::match_cmd::run_match(args, &config_for(cli)?, output),
        Commands::Eval(args) => cmd::eval::run_eval(args, &config_for(cli)?, output),
        Commands::Completions(args) => cmd::completions::run_completions(args.shell, &mut Cli::command()),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_flags_parse() {
        let cli = Cli::parse_from(["vdm", "match", "--author", "Frölich", "--year", "1680", "-n", "3"]);
        let Commands::Match(args) = cli.command else {
            panic!("expected match");
        };
        assert_eq!(args.author.as_deref(), Some("Frölich"));
        assert_eq!(args.limit, 3);
        assert!(!args.no_arbiter);
    }

    #[test]
    fn input_conflicts_with_field_flags() {
        let result = Cli::try_parse_from(["vdm", "match", "--input", "q.json", "--title", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["vdm", "eval", "t.json", "--format", "json", "--config", "c.toml"]);
        assert_eq!(cli.format, Some(OutputMode::Json));
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["vdm", "--json", "index", "stats"]);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn eval_defaults() {
        let cli = Cli::parse_from(["vdm", "eval", "t.json"]);
        let Commands::Eval(args) = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(args.top, 5);
        assert!(args.jobs.is_none());
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["vdm", "index", "build", "--source", "h.jsonl"],
            vec!["vdm", "index", "stats", "--index", "vd.db"],
            vec!["vdm", "match", "--title", "De Peste"],
            vec!["vdm", "eval", "t.json", "--jobs", "2", "--top", "10"],
            vec!["vdm", "completions", "bash"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn default_log_filter_covers_the_binary() {
        for debug in [false, true] {
            let directive = default_log_directive(debug);
            assert!(directive.split(',').any(|d| d.starts_with("vdm=")), "{directive}");
            assert!(directive.split(',').any(|d| d.starts_with("vdmatch=")), "{directive}");
            assert!(directive.parse::<EnvFilter>().is_ok());
        }
        assert!(default_log_directive(false).contains("vdm=info"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
