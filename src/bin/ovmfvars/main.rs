use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indoc::indoc;
use log::{LevelFilter, debug};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

mod compile;
mod dump;
mod export;
mod generate_blank;

/// Reads the whole input, `-` meaning stdin.
pub(crate) fn read_input(input: &str) -> Result<Vec<u8>> {
    let data = if input == "-" {
        let mut data = vec![];
        io::stdin()
            .lock()
            .read_to_end(&mut data)
            .context("failed to read from stdin")?;
        data
    } else {
        fs::read(input).with_context(|| format!("failed to read `{}`", input))?
    };

    debug!("Read {} bytes from `{}`", data.len(), input);
    Ok(data)
}

/// Replaces `path` with `data` in one step, so a failure never leaves a partial file.
///
/// Refuses to overwrite a directory, creates missing parent directories.
pub(crate) fn write_output(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let p = path.as_ref();

    if p.is_dir() {
        bail!(
            "There is a directory at {}, refusing to overwrite",
            p.display()
        );
    }

    let parent = match p.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => bail!("Output file cannot be root."),
    };

    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory `{}`", parent.display()))?;
    }

    let mut file = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create a temporary file in `{}`", parent.display()))?;
    file.write_all(data)?;
    file.flush()?;
    file.persist(p)
        .map_err(|e| format_err!("failed to write `{}`: {}", p.display(), e.error))?;

    debug!("Wrote {} bytes to `{}`", data.len(), p.display());
    Ok(())
}

fn init_logging(matches: &ArgMatches) -> Result<()> {
    let level = match matches.get_count("verbose") {
        0 => return Ok(()),
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3 => LevelFilter::Trace,
        _ => {
            eprintln!("using more than -vvv does not affect verbosity level");
            LevelFilter::Trace
        }
    };

    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logging")
}

fn cli() -> Command {
    Command::new("ovmfvars")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to inspect and generate OVMF_VARS.fd variable store images")
        .long_about(indoc!(
            r#"
            Utility to inspect and generate OVMF_VARS.fd variable store images.

            Images are converted to a YAML document listing every live variable
            by vendor and name, and compiled back from such a document.
        "#
        ))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Sets debug prints level for the application")
                .long_help(indoc!(
                    r#"
                    Sets debug prints level for the application:
                        -v   - info
                        -vv  - debug
                        -vvv - trace
                    NOTE: trace output is only available in debug builds, as it is extremely verbose."#
                )),
        )
        .subcommand(dump::command())
        .subcommand(export::command())
        .subcommand(compile::command())
        .subcommand(generate_blank::command())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches)?;

    match matches.subcommand() {
        Some(("dump", sub)) => dump::run(sub),
        Some(("export", sub)) => export::run(sub),
        Some(("compile", sub)) => compile::run(sub),
        Some(("generate-blank", sub)) => generate_blank::run(sub),
        Some((other, _)) => bail!("unknown subcommand `{}`", other),
        None => bail!("a subcommand is required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }
}
