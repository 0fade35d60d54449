// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create `.deb` package files.

A package is built from a staging directory laid out like the installed
filesystem. The `DEBIAN/` subdirectory supplies the control members
(`control`, `conffiles`, `md5sums`, maintainer scripts); everything else
becomes data members. Both tar members are written uncompressed.
*/

use {
    crate::{
        deb::DEBIAN_BINARY,
        error::{DebError, Result},
    },
    std::{
        fs,
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Name of the control subdirectory inside a staging directory.
pub const CONTROL_DIR: &str = "DEBIAN";

const CONTROL_MODE: u32 = 0o644;
const DATA_MODE: u32 = 0o650;

/// Build a binary package archive from a staging directory.
pub fn build_package(directory: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::create(dest).map_err(|error| DebError::IoPath {
        path: dest.to_path_buf(),
        error,
    })?;
    let mut archive = ar::Builder::new(file);

    append_ar_member(&mut archive, "debian-binary", DEBIAN_BINARY)?;

    let control_dir = directory.join(CONTROL_DIR);
    let control_tar = pack_tarball(&control_dir, CONTROL_MODE, &|_| true)?;
    append_ar_member(&mut archive, "control.tar", &control_tar)?;

    let data_tar = pack_tarball(directory, DATA_MODE, &|path| {
        !path.starts_with(&control_dir)
    })?;
    append_ar_member(&mut archive, "data.tar", &data_tar)?;

    Ok(())
}

fn append_ar_member<W: Write>(
    archive: &mut ar::Builder<W>,
    name: &str,
    body: &[u8],
) -> Result<()> {
    let mut header = ar::Header::new(name.as_bytes().to_vec(), body.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    archive.append(&header, body)?;

    Ok(())
}

/// Pack every regular file under `directory` passing `include` into a tar
/// stream. Entry paths are relative to `directory`; directories are not
/// emitted.
fn pack_tarball(
    directory: &Path,
    mode: u32,
    include: &dyn Fn(&Path) -> bool,
) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    append_directory(&mut builder, directory, directory, mode, include)?;

    Ok(builder.into_inner()?)
}

fn append_directory(
    builder: &mut tar::Builder<Vec<u8>>,
    root: &Path,
    directory: &Path,
    mode: u32,
    include: &dyn Fn(&Path) -> bool,
) -> Result<()> {
    // Sorted traversal keeps archive contents deterministic.
    let mut entries = fs::read_dir(directory)
        .map_err(|error| DebError::IoPath {
            path: directory.to_path_buf(),
            error,
        })?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            append_directory(builder, root, &path, mode, include)?;
        } else if metadata.is_file() {
            if !include(&path) {
                continue;
            }

            let relative: PathBuf = path
                .strip_prefix(root)
                .expect("walked paths stay under the root")
                .to_path_buf();
            let content = fs::read(&path).map_err(|error| DebError::IoPath {
                path: path.clone(),
                error,
            })?;

            let mut header = tar::Header::new_gnu();
            header.set_uid(0);
            header.set_gid(0);
            header.set_mode(mode);
            header.set_mtime(0);
            header.set_size(content.len() as u64);

            builder.append_data(&mut header, &relative, content.as_slice())?;
        }
    }

    Ok(())
}
