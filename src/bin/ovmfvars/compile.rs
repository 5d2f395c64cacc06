use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use indoc::indoc;
use log::info;
use ovmfvars::{Document, GuidRegistry, ImageBuilder};

pub fn command() -> Command {
    Command::new("compile")
        .about("Build an image from a YAML document")
        .long_about(indoc!(
            r#"
            Build a 528 KiB OVMF_VARS.fd image from a document produced by `export`.

            Variables are written in document order. Vendors may be given by a known
            name (e.g. `gEfiGlobalVariableGuid`) or as a GUID. JSON documents are
            accepted as well.
        "#
        ))
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("Path to the document, `-` reads from stdin."),
        )
        .arg(
            Arg::new("OUTPUT")
                .required(true)
                .help("Path of the image to write."),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let input = matches
        .get_one::<String>("INPUT")
        .expect("This is a required argument");
    let output = matches
        .get_one::<String>("OUTPUT")
        .expect("This is a required argument");

    let text = crate::read_input(input)?;
    let document: Document = serde_yaml::from_slice(&text)
        .with_context(|| format!("`{}` is not a valid variables document", input))?;

    let variables = document.to_variables(GuidRegistry::builtin())?;
    let image = ImageBuilder::new().assemble(&variables)?;
    crate::write_output(output, &image)?;

    info!("Compiled {} variables into `{}`", variables.len(), output);
    Ok(())
}
