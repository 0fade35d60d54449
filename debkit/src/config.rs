// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem configuration roots.

The stock Debian tools hard-code their directories under `/`. Threading a
configuration record through the database, cache and acquire pool keeps
every path overridable, which the tests rely on heavily.
*/

use std::path::{Path, PathBuf};

/// Filesystem roots used by the toolchain.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory packages install into.
    pub root_dir: PathBuf,
    /// The dpkg database directory.
    pub var_dir: PathBuf,
    /// The APT configuration directory.
    pub etc_dir: PathBuf,
    /// The APT state directory.
    pub state_dir: PathBuf,
    /// The APT download cache directory.
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            var_dir: PathBuf::from("/var/lib/dpkg"),
            etc_dir: PathBuf::from("/etc/apt"),
            state_dir: PathBuf::from("/var/lib/apt"),
            cache_dir: PathBuf::from("/var/cache/apt"),
        }
    }
}

impl Config {
    /// Rebase every root under `prefix`.
    pub fn with_root(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref();

        Self {
            root_dir: prefix.to_path_buf(),
            var_dir: prefix.join("var/lib/dpkg"),
            etc_dir: prefix.join("etc/apt"),
            state_dir: prefix.join("var/lib/apt"),
            cache_dir: prefix.join("var/cache/apt"),
        }
    }

    /// Path of the dpkg status file.
    pub fn status_file(&self) -> PathBuf {
        self.var_dir.join("status")
    }

    /// Path of the dpkg info directory.
    pub fn info_dir(&self) -> PathBuf {
        self.var_dir.join("info")
    }

    /// Directory caching fetched repository indices.
    pub fn lists_dir(&self) -> PathBuf {
        self.state_dir.join("lists")
    }

    /// Directory caching fetched package archives.
    pub fn archives_dir(&self) -> PathBuf {
        self.cache_dir.join("archives")
    }

    /// Path of the main sources list.
    pub fn sources_list(&self) -> PathBuf {
        self.etc_dir.join("sources.list")
    }

    /// Directory of additional sources lists.
    pub fn sources_list_dir(&self) -> PathBuf {
        self.etc_dir.join("sources.list.d")
    }

    /// Keyring trusted for a distribution's `InRelease` signature.
    pub fn keyring_file(&self, dist: &str) -> PathBuf {
        self.etc_dir
            .join("trusted.gpg.d")
            .join(format!("debian-archive-{}-stable.gpg", dist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_system_paths() {
        let config = Config::default();
        assert_eq!(config.status_file(), PathBuf::from("/var/lib/dpkg/status"));
        assert_eq!(config.lists_dir(), PathBuf::from("/var/lib/apt/lists"));
        assert_eq!(
            config.keyring_file("buster"),
            PathBuf::from("/etc/apt/trusted.gpg.d/debian-archive-buster-stable.gpg")
        );
    }

    #[test]
    fn with_root_rebases_everything() {
        let config = Config::with_root("/tmp/sandbox");
        assert_eq!(
            config.archives_dir(),
            PathBuf::from("/tmp/sandbox/var/cache/apt/archives")
        );
        assert_eq!(
            config.sources_list(),
            PathBuf::from("/tmp/sandbox/etc/apt/sources.list")
        );
    }
}
