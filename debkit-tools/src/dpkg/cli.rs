// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, Command},
    debkit::{config::Config, deb::builder::build_package, error::DebError, installer},
    std::path::{Path, PathBuf},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Debian(#[from] DebError),

    #[error("missing argument(s): {0}")]
    MissingArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, CliError>;

pub fn run_cli() -> Result<()> {
    let matches = Command::new("dpkg")
        .about("Build and install Debian package archives")
        .arg_required_else_help(true)
        .arg(
            Arg::new("build")
                .long("build")
                .help("Create a package archive from a staging directory"),
        )
        .arg(
            Arg::new("install")
                .long("install")
                .help("Install package archives"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .takes_value(true)
                .help("Rebase all filesystem roots under this directory"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase diagnostic verbosity"),
        )
        .arg(
            Arg::new("args")
                .takes_value(true)
                .multiple_values(true)
                .help("Staging directory and destination, or archive paths"),
        )
        .get_matches();

    stderrlog::new()
        .verbosity(matches.occurrences_of("verbose") as usize)
        .init()
        .ok();

    let config = match matches.value_of("root") {
        Some(root) => Config::with_root(root),
        None => Config::default(),
    };
    log::debug!("database under {}", config.var_dir.display());

    let args = matches
        .values_of("args")
        .map(|values| values.collect::<Vec<_>>())
        .unwrap_or_default();

    if matches.is_present("build") {
        let (directory, dest) = match args.as_slice() {
            [directory, dest, ..] => (directory, dest),
            _ => return Err(CliError::MissingArgument("directory and destination")),
        };

        build_package(Path::new(directory), Path::new(dest))?;
    } else if matches.is_present("install") {
        if args.is_empty() {
            return Err(CliError::MissingArgument("package archive(s)"));
        }

        let archives = args.iter().map(PathBuf::from).collect::<Vec<_>>();
        installer::install_archives(&config, &archives)?;
    }

    Ok(())
}
