// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package records.

A [PackageInfo] mirrors one paragraph of the dpkg `status` file together
with the per-package files under `info/`: the installed file list, recorded
MD5 digests, conffile list and maintainer scripts.
*/

use {
    crate::{
        control::{ControlFile, ControlParagraph},
        error::{DebError, Result},
    },
    log::debug,
    md5::{Digest, Md5},
    std::{
        collections::BTreeMap,
        fmt, fs,
        io::{Cursor, Read},
        os::unix::fs::{DirBuilderExt, PermissionsExt},
        path::{Path, PathBuf},
        process::Command,
        str::FromStr,
    },
};

/// The maintainer script names recognised in control archives and `info/`.
pub const MAINTAINER_SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm"];

/// Installation state of a package record.
///
/// ```text
/// not-installed --unpack--> unpacked --configure--> half-configured --> installed
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageStatus {
    NotInstalled,
    Unpacked,
    HalfConfigured,
    Installed,
}

impl PackageStatus {
    /// The status keyword as written in the `Status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not-installed",
            Self::Unpacked => "unpacked",
            Self::HalfConfigured => "half-configured",
            Self::Installed => "installed",
        }
    }
}

impl FromStr for PackageStatus {
    type Err = DebError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // Freshly-registered records carry the `non-installed` spelling.
            "not-installed" | "non-installed" => Ok(Self::NotInstalled),
            "unpacked" => Ok(Self::Unpacked),
            "half-configured" => Ok(Self::HalfConfigured),
            "installed" => Ok(Self::Installed),
            other => Err(DebError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One package known to the local database.
#[derive(Clone, Debug)]
pub struct PackageInfo {
    var_dir: PathBuf,

    /// The record's `status` file paragraph. Its first two fields are
    /// always `Package` then `Status`.
    pub paragraph: ControlParagraph,

    /// Absolute paths of installed files (`info/<prefix>.list`).
    pub files: Vec<String>,
    /// MD5 digests keyed by absolute path (`info/<prefix>.md5sums`).
    pub md5sums: BTreeMap<String, String>,
    /// Tracked configuration files (`info/<prefix>.conffiles`).
    pub conffiles: Vec<String>,
    /// Maintainer script bodies keyed by script name.
    pub maintainer_scripts: BTreeMap<String, String>,

    pub status: PackageStatus,
    pub(crate) status_dirty: bool,
}

impl PackageInfo {
    /// Build a record from a `status` paragraph, loading its info files.
    ///
    /// All info files are optional; a paragraph with none still yields a
    /// record.
    pub fn from_status_paragraph(var_dir: &Path, paragraph: ControlParagraph) -> Result<Self> {
        let status_field = paragraph.field_str("Status").unwrap_or_default();
        let status = status_field
            .split_whitespace()
            .nth(2)
            .ok_or_else(|| DebError::UnknownStatus(status_field.to_string()))?
            .parse::<PackageStatus>()?;

        let mut package = Self {
            var_dir: var_dir.to_path_buf(),
            paragraph,
            files: Vec::new(),
            md5sums: BTreeMap::new(),
            conffiles: Vec::new(),
            maintainer_scripts: BTreeMap::new(),
            status,
            status_dirty: false,
        };

        if let Some(content) = package.read_info_file("list")? {
            package.files = parse_path_lines(&content);
        }
        if let Some(content) = package.read_info_file("md5sums")? {
            package.md5sums = parse_md5sums(&content);
        }
        if let Some(content) = package.read_info_file("conffiles")? {
            package.conffiles = parse_path_lines(&content);
        }
        for script in MAINTAINER_SCRIPTS {
            if let Some(content) = package.read_info_file(script)? {
                package
                    .maintainer_scripts
                    .insert(script.to_string(), content);
            }
        }

        Ok(package)
    }

    /// Build a record from the decompressed `control.tar` of an archive.
    ///
    /// The resulting paragraph starts with `Package` then `Status`
    /// (`install ok non-installed`), followed by the remaining control
    /// fields in their original order.
    pub fn from_control_tar(var_dir: &Path, control_tar: &[u8]) -> Result<Self> {
        let mut package = Self {
            var_dir: var_dir.to_path_buf(),
            paragraph: ControlParagraph::default(),
            files: Vec::new(),
            md5sums: BTreeMap::new(),
            conffiles: Vec::new(),
            maintainer_scripts: BTreeMap::new(),
            status: PackageStatus::NotInstalled,
            status_dirty: true,
        };

        let mut saw_control = false;

        let mut archive = tar::Archive::new(Cursor::new(control_tar));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let member = match entry.path()?.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };

            let mut content = String::new();
            entry.read_to_string(&mut content)?;

            match member.as_str() {
                "control" => {
                    let control = ControlFile::parse_str(&content)?;
                    let source = control
                        .paragraphs()
                        .next()
                        .ok_or(DebError::ControlNoParagraph)?;

                    package.paragraph.set_field(
                        "Package",
                        source.field_str("Package").unwrap_or_default().to_string(),
                    );
                    package
                        .paragraph
                        .set_field("Status", "install ok non-installed".to_string());
                    for field in source.iter_fields() {
                        if field.name().eq_ignore_ascii_case("Package") {
                            continue;
                        }
                        package
                            .paragraph
                            .set_field(field.name(), field.value().to_string());
                    }

                    saw_control = true;
                }
                "conffiles" => package.conffiles = parse_path_lines(&content),
                "md5sums" => package.md5sums = parse_md5sums(&content),
                name if MAINTAINER_SCRIPTS.contains(&name) => {
                    package
                        .maintainer_scripts
                        .insert(name.to_string(), content);
                }
                _ => {}
            }
        }

        if !saw_control {
            return Err(DebError::DebMissingControl);
        }

        Ok(package)
    }

    pub fn name(&self) -> &str {
        self.paragraph.field_str("Package").unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.paragraph.field_str("Version").unwrap_or_default()
    }

    pub fn architecture(&self) -> &str {
        self.paragraph.field_str("Architecture").unwrap_or_default()
    }

    fn is_conffile(&self, path: &str) -> bool {
        self.conffiles.iter().any(|conffile| conffile == path)
    }

    /// Advance the state machine, keeping the `Status` field in step.
    ///
    /// Only the third token of the field changes; the want/ok flags are
    /// preserved.
    pub fn set_status(&mut self, status: PackageStatus) {
        let old = self
            .paragraph
            .field_str("Status")
            .unwrap_or("install ok")
            .to_string();
        let mut tokens = old.split_whitespace();
        let want = tokens.next().unwrap_or("install").to_string();
        let flag = tokens.next().unwrap_or("ok").to_string();

        self.paragraph
            .set_field("Status", format!("{} {} {}", want, flag, status.as_str()));
        self.status = status;
        self.status_dirty = true;
    }

    /// The `info/` file prefix for this record.
    ///
    /// If `<name>.list` is absent but `<name>:<arch>.list` exists, the
    /// architecture-qualified prefix is used. Newly-unpacked packages use
    /// the unqualified form.
    pub fn prefix_name(&self) -> String {
        if self.status == PackageStatus::NotInstalled {
            return self.name().to_string();
        }

        let info_dir = self.var_dir.join("info");

        let prefix = self.name().to_string();
        if info_dir.join(format!("{}.list", prefix)).exists() {
            return prefix;
        }

        let qualified = format!("{}:{}", self.name(), self.architecture());
        if info_dir.join(format!("{}.list", qualified)).exists() {
            return qualified;
        }

        prefix
    }

    /// Path of one of this record's info files.
    pub fn info_path(&self, filename: &str) -> PathBuf {
        self.var_dir
            .join("info")
            .join(format!("{}.{}", self.prefix_name(), filename))
    }

    fn read_info_file(&self, filename: &str) -> Result<Option<String>> {
        let path = self.info_path(filename);
        if !path.exists() {
            return Ok(None);
        }

        fs::read_to_string(&path)
            .map(Some)
            .map_err(|error| DebError::IoPath { path, error })
    }

    /// Run a maintainer script if the package carries one.
    ///
    /// The script body is written under `info/` with mode 0755 and executed
    /// as `/bin/sh <path>`; captured stdout is echoed. A non-zero exit is a
    /// hard failure.
    ///
    /// There is no sandbox: installing an untrusted package executes
    /// arbitrary shell with the caller's privileges.
    pub fn run_maintainer_script(&self, name: &str) -> Result<()> {
        let body = match self.maintainer_scripts.get(name) {
            Some(body) => body,
            None => return Ok(()),
        };

        let path = self.info_path(name);
        if let Some(parent) = path.parent() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(parent)?;
        }
        write_file(&path, body.as_bytes(), 0o755)?;

        debug!("running maintainer script {}", path.display());

        let output = Command::new("/bin/sh")
            .arg(&path)
            .output()
            .map_err(|error| DebError::MaintainerScript {
                script: name.to_string(),
                reason: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(DebError::MaintainerScript {
                script: name.to_string(),
                reason: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        print!("{}", String::from_utf8_lossy(&output.stdout));

        Ok(())
    }

    /// Extract the regular files of a data archive onto the filesystem.
    ///
    /// Destinations are normalised to absolute paths; conffiles are staged
    /// at `<path>.dpkg-new`. Every written file is recorded in the file
    /// list with its MD5 digest.
    pub(crate) fn extract_data_tar(&mut self, data_tar: &[u8]) -> Result<()> {
        let mut archive = tar::Archive::new(Cursor::new(data_tar));

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let dest = normalize_dest(&entry.path()?.to_string_lossy());

            let staged = if self.is_conffile(&dest) {
                format!("{}.dpkg-new", dest)
            } else {
                dest.clone()
            };

            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;

            if let Some(parent) = Path::new(&staged).parent() {
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o755)
                    .create(parent)?;
            }
            write_file(Path::new(&staged), &content, 0o755)?;

            self.md5sums
                .insert(dest.clone(), hex::encode(Md5::digest(&content)));
            self.files.push(dest);
        }

        Ok(())
    }

    /// Promote staged conffiles to their final names.
    ///
    /// A missing staging file is fatal.
    pub(crate) fn rename_conffiles(&self) -> Result<()> {
        for conffile in &self.conffiles {
            let staged = format!("{}.dpkg-new", conffile);
            if !Path::new(&staged).exists() {
                return Err(DebError::ConffileMissing(staged));
            }
            fs::rename(&staged, conffile)?;
        }

        Ok(())
    }

    /// Rewrite this record's info files.
    pub(crate) fn sync_info(&mut self) -> Result<()> {
        write_file(&self.info_path("list"), format_path_lines(&self.files).as_bytes(), 0o644)?;
        write_file(
            &self.info_path("md5sums"),
            format_md5sums(&self.md5sums).as_bytes(),
            0o644,
        )?;
        write_file(
            &self.info_path("conffiles"),
            format_path_lines(&self.conffiles).as_bytes(),
            0o644,
        )?;
        for (name, body) in &self.maintainer_scripts {
            write_file(&self.info_path(name), body.as_bytes(), 0o755)?;
        }

        self.status_dirty = false;

        Ok(())
    }
}

/// Normalise a tar entry name to the absolute installation path.
fn normalize_dest(name: &str) -> String {
    let name = name.strip_prefix("./").unwrap_or(name);
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    fs::write(path, content).map_err(|error| DebError::IoPath {
        path: path.to_path_buf(),
        error,
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;

    Ok(())
}

/// Parse a one-path-per-line info file.
pub fn parse_path_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Format a one-path-per-line info file, final newline terminated.
pub fn format_path_lines(paths: &[String]) -> String {
    format!("{}\n", paths.join("\n"))
}

/// Parse an `md5sums` file: lines of `<hex>  <relative-path>`.
///
/// Keys are normalised back to absolute paths.
pub fn parse_md5sums(content: &str) -> BTreeMap<String, String> {
    let mut sums = BTreeMap::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((digest, path)) = line.split_once("  ") {
            sums.insert(normalize_dest(path), digest.to_string());
        }
    }

    sums
}

/// Format an `md5sums` file; recorded absolute paths are written relative.
pub fn format_md5sums(sums: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (path, digest) in sums {
        out.push_str(digest);
        out.push_str("  ");
        out.push_str(path.trim_start_matches('/'));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control_tar(members: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("./{}", name), content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    const CONTROL: &str = "Package: test\nVersion: 1.1-1\nSection: base\nArchitecture: all\nDescription: Test\n";

    #[test]
    fn control_tar_paragraph_starts_with_package_then_status() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let tar = control_tar(&[
            ("control", CONTROL),
            ("conffiles", "/etc/test.conf\n"),
            ("preinst", "#!/bin/sh\nexit 0\n"),
        ]);

        let package = PackageInfo::from_control_tar(tmp.path(), &tar)?;

        let names = package
            .paragraph
            .iter_fields()
            .map(|f| f.name())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "Package",
                "Status",
                "Version",
                "Section",
                "Architecture",
                "Description"
            ]
        );
        assert_eq!(
            package.paragraph.field_str("Status"),
            Some("install ok non-installed")
        );
        assert_eq!(package.status, PackageStatus::NotInstalled);
        assert_eq!(package.conffiles, vec!["/etc/test.conf"]);
        assert!(package.maintainer_scripts.contains_key("preinst"));

        Ok(())
    }

    #[test]
    fn control_member_is_required() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = control_tar(&[("md5sums", "")]);

        assert!(matches!(
            PackageInfo::from_control_tar(tmp.path(), &tar),
            Err(DebError::DebMissingControl)
        ));
    }

    #[test]
    fn set_status_rewrites_third_token_only() -> Result<()> {
        let tmp = tempfile::tempdir().unwrap();
        let tar = control_tar(&[("control", CONTROL)]);
        let mut package = PackageInfo::from_control_tar(tmp.path(), &tar)?;

        package.set_status(PackageStatus::Unpacked);
        assert_eq!(
            package.paragraph.field_str("Status"),
            Some("install ok unpacked")
        );

        package.set_status(PackageStatus::Installed);
        assert_eq!(
            package.paragraph.field_str("Status"),
            Some("install ok installed")
        );
        assert!(package.status_dirty);

        Ok(())
    }

    #[test]
    fn md5sums_round_trip_relative_paths() {
        let content = "4a3f9f0ca96f401e54f58a7bec8b659c  usr/bin/vim.basic\n";
        let sums = parse_md5sums(content);

        assert_eq!(
            sums.get("/usr/bin/vim.basic"),
            Some(&"4a3f9f0ca96f401e54f58a7bec8b659c".to_string())
        );
        assert_eq!(format_md5sums(&sums), content);
    }

    #[test]
    fn destinations_are_normalized() {
        assert_eq!(normalize_dest("./usr/bin/test"), "/usr/bin/test");
        assert_eq!(normalize_dest("usr/bin/test"), "/usr/bin/test");
        assert_eq!(normalize_dest("/usr/bin/test"), "/usr/bin/test");
    }

    #[test]
    fn status_keyword_parsing() {
        assert_eq!(
            "half-configured".parse::<PackageStatus>().unwrap(),
            PackageStatus::HalfConfigured
        );
        assert_eq!(
            "non-installed".parse::<PackageStatus>().unwrap(),
            PackageStatus::NotInstalled
        );
        assert!("borked".parse::<PackageStatus>().is_err());
    }
}
