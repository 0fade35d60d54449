// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The `dpkg --install` driver.

For each archive: parse the control tar into a database record, persist it,
unpack the data tar, then configure. A failing archive leaves its record in
the last synced state; remaining archives are still processed and the
session reports failure.
*/

use {
    crate::{
        config::Config,
        database::{package::PackageInfo, Database},
        deb::reader::read_package,
        error::{DebError, Result},
    },
    std::path::Path,
};

/// Install package archives against the local database.
pub fn install_archives(config: &Config, archives: &[impl AsRef<Path>]) -> Result<()> {
    let mut db = Database::load(&config.var_dir)?;

    println!(
        "(Reading database ... {} files and directories currently installed.)",
        db.installed_files()
    );

    let mut failed = Vec::new();
    for archive in archives {
        let archive = archive.as_ref();
        if let Err(error) = process_archive(&mut db, archive) {
            eprintln!(
                "dpkg: error processing archive {}: {}",
                archive.display(),
                error
            );
            failed.push(archive.display().to_string());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(DebError::InstallationFailed(failed.join("\n\t")))
    }
}

/// Unpack and configure a single archive.
fn process_archive(db: &mut Database, path: &Path) -> Result<()> {
    let (control_tar, data_tar) = read_package(path)?;

    let package = PackageInfo::from_control_tar(db.var_dir(), &control_tar)?;
    db.packages.push(package);
    let index = db.packages.len() - 1;
    db.sync()?;

    println!(
        "Preparing to unpack {} ...",
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    db.unpack(index, &data_tar)?;
    db.configure(index)?;

    Ok(())
}
