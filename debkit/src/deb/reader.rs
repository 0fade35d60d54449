// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read `.deb` package files. */

use {
    crate::{
        deb::{Compression, DEBIAN_BINARY},
        error::{DebError, Result},
    },
    std::{
        fs,
        io::Read,
        path::Path,
    },
};

/// A parsed member of a binary package archive.
#[derive(Clone, Debug)]
pub enum PackageEntry {
    /// The `debian-binary` member: the archive format version.
    Version(String),
    /// The decompressed `control.tar` contents.
    Control(Vec<u8>),
    /// The decompressed `data.tar` contents.
    Data(Vec<u8>),
}

/// Streaming reader for `.deb` archives.
///
/// Members are interpreted by position (`debian-binary`, `control.tar`,
/// `data.tar`) since that order is part of the format. The member name
/// only selects the decompressor for the tar members.
pub struct BinaryPackageReader<R: Read> {
    archive: ar::Archive<R>,
    member: usize,
}

impl<R: Read> BinaryPackageReader<R> {
    /// Create a new instance bound to a reader of `.deb` file content.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
            member: 0,
        }
    }

    /// Read the next archive member.
    pub fn next_entry(&mut self) -> Result<Option<PackageEntry>> {
        let mut entry = match self.archive.next_entry() {
            Some(entry) => entry?,
            None => return Ok(None),
        };

        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();

        let parsed = match self.member {
            0 => {
                let mut version = String::new();
                entry.read_to_string(&mut version)?;

                if version.as_bytes() != DEBIAN_BINARY {
                    return Err(DebError::DebFormatVersion(version));
                }

                PackageEntry::Version(version)
            }
            1 => PackageEntry::Control(read_tar_member(&name, &mut entry)?),
            2 => PackageEntry::Data(read_tar_member(&name, &mut entry)?),
            _ => return Err(DebError::DebUnexpectedMember(name)),
        };

        self.member += 1;

        Ok(Some(parsed))
    }
}

/// Read a tar member, transparently decompressing per the member name.
fn read_tar_member(name: &str, reader: &mut impl Read) -> Result<Vec<u8>> {
    let mut content = Vec::new();

    match Compression::from_member_name(name)? {
        Compression::None => {
            reader.read_to_end(&mut content)?;
        }
        Compression::Gzip => {
            let mut decoder = libflate::gzip::Decoder::new(reader)?;
            decoder.read_to_end(&mut content)?;
        }
        Compression::Xz => {
            let mut decoder = xz2::read::XzDecoder::new(reader);
            decoder.read_to_end(&mut content)?;
        }
    }

    Ok(content)
}

/// Read the control and data tar streams of a package archive on disk.
pub fn read_package(path: &Path) -> Result<(Vec<u8>, Vec<u8>)> {
    let file = fs::File::open(path).map_err(|error| DebError::IoPath {
        path: path.to_path_buf(),
        error,
    })?;
    let mut reader = BinaryPackageReader::new(file);

    let mut control_tar = None;
    let mut data_tar = None;

    while let Some(entry) = reader.next_entry()? {
        match entry {
            PackageEntry::Version(_) => {}
            PackageEntry::Control(content) => control_tar = Some(content),
            PackageEntry::Data(content) => data_tar = Some(content),
        }
    }

    match (control_tar, data_tar) {
        (Some(control_tar), Some(data_tar)) => Ok((control_tar, data_tar)),
        _ => Err(DebError::DebMissingControl),
    }
}

/// Read only the control tar stream of a package archive on disk.
///
/// Stops before the data member, so registering a large local archive does
/// not decompress its payload.
pub fn read_control_tar(path: &Path) -> Result<Vec<u8>> {
    let file = fs::File::open(path).map_err(|error| DebError::IoPath {
        path: path.to_path_buf(),
        error,
    })?;
    let mut reader = BinaryPackageReader::new(file);

    while let Some(entry) = reader.next_entry()? {
        if let PackageEntry::Control(content) = entry {
            return Ok(content);
        }
    }

    Err(DebError::DebMissingControl)
}
