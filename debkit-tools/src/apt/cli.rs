// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, Command},
    debkit::{apt, config::Config, error::DebError},
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

pub async fn run_cli() -> Result<()> {
    let matches = Command::new("apt")
        .about("Resolve, download and install Debian packages")
        .arg_required_else_help(true)
        .arg(
            Arg::new("install")
                .long("install")
                .help("Install packages by name or from local archives"),
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
            Arg::new("packages")
                .takes_value(true)
                .multiple_values(true)
                .help("Package names or .deb paths"),
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
    log::debug!("sources under {}", config.etc_dir.display());

    if matches.is_present("install") {
        let packages = matches
            .values_of("packages")
            .map(|values| values.map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();

        if packages.is_empty() {
            return Err(CliError::MissingArgument("package name(s)"));
        }

        apt::install(config, &packages).await?;
    }

    Ok(())
}
