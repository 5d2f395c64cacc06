use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use indoc::indoc;
use ovmfvars::{Document, GuidRegistry, VarStoreParser};
use std::io::{self, Write};

pub fn command() -> Command {
    Command::new("export")
        .about("Convert an image to a YAML (or JSON) document")
        .long_about(indoc!(
            r#"
            Convert the live variables of an image to a document grouped by vendor,
            then by variable name. Deleted variables are left out.

            The document can be edited and turned back into an image with `compile`.
        "#
        ))
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("Path to an OVMF_VARS.fd image, `-` reads from stdin."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["yaml", "json"])
                .default_value("yaml")
                .help("Sets the output format"),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .value_name("PATH")
                .help(
                    "Writes output to the file specified instead of stdout, errors will still be printed to stderr. \
                     Will create parent directories if needed.",
                ),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let input = matches
        .get_one::<String>("INPUT")
        .expect("This is a required argument");

    let parser = VarStoreParser::from_buffer(crate::read_input(input)?)
        .with_context(|| format!("`{}` is not a supported variable store", input))?;
    let variables = parser
        .collect_variables()
        .with_context(|| format!("failed to decode `{}`", input))?;
    let document = Document::from_variables(&variables, GuidRegistry::builtin())?;

    let text = match matches
        .get_one::<String>("output-format")
        .map(String::as_str)
    {
        Some("json") => {
            let mut text = serde_json::to_string_pretty(&document)?;
            text.push('\n');
            text
        }
        _ => serde_yaml::to_string(&document)?,
    };

    match matches.get_one::<String>("output-target") {
        Some(path) => crate::write_output(path, text.as_bytes())?,
        None => io::stdout().lock().write_all(text.as_bytes())?,
    }

    Ok(())
}
