// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The local package database.

The database lives under a configurable directory (`/var/lib/dpkg` on a
real system): the `status` document with one paragraph per known package,
and per-package info files under `info/`.

Lifecycle transitions run through [Database::unpack] and
[Database::configure] so that every status change persists both the
record's info files and the status document before the operation is
considered complete. The previous `status` is rotated to `status-old`
before each rewrite.
*/

use {
    crate::{
        control::{ControlFile, ControlParagraphReader},
        error::{DebError, Result},
    },
    log::debug,
    std::{
        fs,
        io::BufReader,
        os::unix::fs::{DirBuilderExt, PermissionsExt},
        path::{Path, PathBuf},
    },
};

pub mod package;

pub use package::{PackageInfo, PackageStatus};

/// The package database as loaded from disk.
#[derive(Debug)]
pub struct Database {
    var_dir: PathBuf,
    pub packages: Vec<PackageInfo>,
}

impl Database {
    /// Load the database rooted at `var_dir`.
    pub fn load(var_dir: &Path) -> Result<Self> {
        let status_path = var_dir.join("status");
        let file = fs::File::open(&status_path).map_err(|error| DebError::IoPath {
            path: status_path,
            error,
        })?;

        let mut packages = Vec::new();
        for paragraph in ControlParagraphReader::new(BufReader::new(file)) {
            packages.push(PackageInfo::from_status_paragraph(var_dir, paragraph?)?);
        }

        debug!("loaded {} package records", packages.len());

        Ok(Self {
            var_dir: var_dir.to_path_buf(),
            packages,
        })
    }

    /// The directory this database persists under.
    pub fn var_dir(&self) -> &Path {
        &self.var_dir
    }

    /// Number of files recorded by installed packages.
    ///
    /// An approximation used by the reading-database banner.
    pub fn installed_files(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.status == PackageStatus::Installed)
            .map(|p| p.files.len())
            .sum()
    }

    /// Find the position of a record by package name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name() == name)
    }

    /// Persist dirty records and rewrite the status document.
    ///
    /// The current `status` is renamed to `status-old` first; its absence
    /// is not an error on a fresh database.
    pub fn sync(&mut self) -> Result<()> {
        let info_dir = self.var_dir.join("info");
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&info_dir)
            .map_err(|error| DebError::IoPath {
                path: info_dir,
                error,
            })?;

        let mut document = ControlFile::default();
        for package in &mut self.packages {
            document.add_paragraph(package.paragraph.clone());

            if package.status_dirty {
                package.sync_info()?;
            }
        }

        let status_path = self.var_dir.join("status");
        let _ = fs::rename(&status_path, self.var_dir.join("status-old"));

        let mut content = Vec::new();
        document.write(&mut content)?;
        fs::write(&status_path, content).map_err(|error| DebError::IoPath {
            path: status_path.clone(),
            error,
        })?;
        fs::set_permissions(&status_path, fs::Permissions::from_mode(0o644))?;

        debug!("status file rewritten ({} paragraphs)", self.packages.len());

        Ok(())
    }

    /// Unpack a package's data archive.
    ///
    /// Runs `preinst` first, extracts the payload, then records the
    /// `unpacked` state.
    pub fn unpack(&mut self, index: usize, data_tar: &[u8]) -> Result<()> {
        {
            let package = &mut self.packages[index];
            package.run_maintainer_script("preinst")?;

            println!("Unpacking {} ({}) ...", package.name(), package.version());

            package.extract_data_tar(data_tar)?;
            package.set_status(PackageStatus::Unpacked);
        }

        self.sync()
    }

    /// Configure an unpacked package.
    ///
    /// Promotes staged conffiles, records `half-configured`, runs
    /// `postinst`, then records `installed`.
    pub fn configure(&mut self, index: usize) -> Result<()> {
        {
            let package = &mut self.packages[index];

            println!("Setting up {} ({}) ...", package.name(), package.version());

            package.rename_conffiles()?;
            package.set_status(PackageStatus::HalfConfigured);
        }
        self.sync()?;

        self.packages[index].run_maintainer_script("postinst")?;

        self.packages[index].set_status(PackageStatus::Installed);
        self.sync()
    }
}
