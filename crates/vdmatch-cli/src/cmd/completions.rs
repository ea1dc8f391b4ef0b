use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `vdm completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate the script for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Print the completion script for `shell` on stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be flushed.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let mut out = io::stdout().lock();
    write_completions(shell, command, &mut out)?;
    out.flush().context("flush completion script")
}

/// Write the script to `out`, completing under the command's own binary
/// name so a renamed `vdm` build still gets matching completions.
fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) -> Result<()> {
    let bin_name = command
        .get_bin_name()
        .unwrap_or_else(|| command.get_name())
        .to_owned();
    tracing::debug!(%shell, bin = %bin_name, "generating completions");
    generate(shell, command, bin_name, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, Command};

    fn sample_cli() -> Command {
        Command::new("vdm")
            .subcommand(Command::new("index").arg(Arg::new("catalog")))
            .subcommand(Command::new("match").arg(Arg::new("query")))
    }

    #[test]
    fn bash_script_completes_the_binary_and_subcommands() {
        let mut buf = Vec::new();
        write_completions(Shell::Bash, &mut sample_cli(), &mut buf).expect("generate");
        let script = String::from_utf8(buf).expect("utf8");
        assert!(script.contains("_vdm()"), "{script}");
        assert!(script.contains("complete -F _vdm"));
        assert!(script.contains("index"));
        assert!(script.contains("match"));
    }

    #[test]
    fn script_follows_renamed_binary() {
        let mut buf = Vec::new();
        write_completions(Shell::Zsh, &mut sample_cli().bin_name("vdm-nightly"), &mut buf)
            .expect("generate");
        let script = String::from_utf8(buf).expect("utf8");
        assert!(script.contains("#compdef vdm-nightly"), "{script}");
    }
}
