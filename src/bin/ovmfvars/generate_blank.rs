use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use ovmfvars::ImageBuilder;

pub fn command() -> Command {
    Command::new("generate-blank")
        .about("Write an image with an empty variable store")
        .arg(
            Arg::new("OUTPUT")
                .required(true)
                .help("Path of the image to write."),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let output = matches
        .get_one::<String>("OUTPUT")
        .expect("This is a required argument");

    let image = ImageBuilder::new().blank()?;
    crate::write_output(output, &image)
}
