// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read and write `.deb` package archives.

A `.deb` file is an `ar` archive with exactly three members, in order:

1. `debian-binary`: the literal format version `2.0\n`.
2. `control.tar[.gz|.xz]`: package metadata and maintainer scripts.
3. `data.tar[.gz|.xz]`: the files to install.

[builder] produces archives from a staging directory; [reader] consumes
them member by member.
*/

use crate::error::{DebError, Result};

pub mod builder;
pub mod reader;

/// Body of the `debian-binary` member.
pub const DEBIAN_BINARY: &[u8] = b"2.0\n";

/// Compression applied to a tar member, derived from its ar member name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
}

impl Compression {
    /// Infer the compression format from an ar member name.
    pub fn from_member_name(name: &str) -> Result<Self> {
        if name.ends_with(".tar") {
            Ok(Self::None)
        } else if name.ends_with(".tar.gz") {
            Ok(Self::Gzip)
        } else if name.ends_with(".tar.xz") {
            Ok(Self::Xz)
        } else {
            Err(DebError::DebUnknownCompression(name.to_string()))
        }
    }
}
