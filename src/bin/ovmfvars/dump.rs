use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indoc::indoc;
use ovmfvars::{GuidRegistry, VarStoreParser};
use std::io::{self, Write};

pub fn command() -> Command {
    Command::new("dump")
        .about("Print the headers and variables of an image")
        .long_about(indoc!(
            r#"
            Print the firmware volume header, the variable store header and every
            live variable of an image, with a hex dump of each payload.
        "#
        ))
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("Path to an OVMF_VARS.fd image, `-` reads from stdin."),
        )
        .arg(
            Arg::new("deleted")
                .long("deleted")
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Also print deleted variables."),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let input = matches
        .get_one::<String>("INPUT")
        .expect("This is a required argument");
    let show_deleted = matches.get_flag("deleted");

    let parser = VarStoreParser::from_buffer(crate::read_input(input)?)
        .with_context(|| format!("`{}` is not a supported variable store", input))?;
    let registry = GuidRegistry::builtin();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "{}", parser.volume_header().display_with(registry))?;
    writeln!(out, "{}", parser.store_header())?;

    for variable in parser.variables() {
        let variable = variable.with_context(|| format!("failed to decode `{}`", input))?;
        if variable.is_deleted() && !show_deleted {
            continue;
        }
        writeln!(out, "{}", variable.display_with(registry))?;
    }

    Ok(())
}
