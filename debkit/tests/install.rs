// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! End-to-end build and install scenarios.

These tests stage a package whose payload paths live under the test's
temporary directory (the data tar records absolute destinations, so the
package is built to install into the sandbox), then drive the real
build, parse, unpack and configure pipeline against a seeded database.
*/

use {
    debkit::{
        config::Config,
        database::{package::PackageInfo, Database, PackageStatus},
        deb::{builder::build_package, reader::read_package},
        error::Result,
        installer,
    },
    md5::{Digest, Md5},
    std::{fs, path::Path},
};

const VIM_PARAGRAPH: &str = "\
Package: vim
Status: install ok installed
Priority: optional
Section: editors
Architecture: amd64
Version: 2:8.2.2434-3
Depends: vim-common (= 2:8.2.2434-3), libc6 (>= 2.29)
Description: Vi IMproved - enhanced vi editor
 Vim is an almost compatible version of the UNIX editor Vi.
 .
 This package contains a version of vim compiled with a rather
 standard set of features.
";

const PAYLOAD: &str = "#!/bin/bash\necho X\n";

fn seed_dpkg_database(config: &Config, status: &str) {
    fs::create_dir_all(config.info_dir()).unwrap();
    fs::write(config.status_file(), status).unwrap();
}

/// Stage a buildable package whose payload installs under `root`.
///
/// Returns the staging directory. The payload is placed at
/// `<staging>/<root>/out/test` so the recorded absolute destination stays
/// inside the sandbox.
fn stage_package(root: &Path, control: &str, extra_control: &[(&str, String)]) -> std::path::PathBuf {
    let staging = root.join("1.1-1");
    let root_relative = root.strip_prefix("/").unwrap_or(root);

    fs::create_dir_all(staging.join("DEBIAN")).unwrap();
    fs::write(staging.join("DEBIAN/control"), control).unwrap();
    for (name, content) in extra_control {
        fs::write(staging.join("DEBIAN").join(name), content).unwrap();
    }

    let payload_dir = staging.join(root_relative).join("out");
    fs::create_dir_all(&payload_dir).unwrap();
    fs::write(payload_dir.join("test"), PAYLOAD).unwrap();

    staging
}

#[test]
fn install_appends_status_paragraph_and_unpacks() -> Result<()> {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let config = Config::with_root(root);

    seed_dpkg_database(&config, VIM_PARAGRAPH);

    let control = "\
Package: test
Version: 1.1-1
Section: base
Priority: optional
Architecture: all
Maintainer: Jane Random
Description: Test
";

    // The preinst proves it ran before any data member was written.
    let installed_file = root.join("out/test");
    let sentinel = root.join("preinst-ran");
    let preinst = format!(
        "#!/bin/sh\ntest ! -e {} || exit 1\ntouch {}\n",
        installed_file.display(),
        sentinel.display()
    );

    let staging = stage_package(root, control, &[("preinst", preinst.clone())]);
    let archive = root.join("test.deb");
    build_package(&staging, &archive)?;

    installer::install_archives(&config, &[&archive])?;

    // The original paragraph is retained and the new one follows it.
    let expected_status = format!(
        "{}\n\
Package: test
Status: install ok installed
Version: 1.1-1
Section: base
Priority: optional
Architecture: all
Maintainer: Jane Random
Description: Test
",
        VIM_PARAGRAPH
    );
    assert_eq!(fs::read_to_string(config.status_file())?, expected_status);

    // The previous status survived as status-old.
    assert!(config.var_dir.join("status-old").exists());

    // The payload landed and preinst ran first.
    assert_eq!(fs::read_to_string(&installed_file)?, PAYLOAD);
    assert!(sentinel.exists());

    // The info files describe the payload.
    let list = fs::read_to_string(config.info_dir().join("test.list"))?;
    assert_eq!(list, format!("{}\n", installed_file.display()));

    let md5 = hex::encode(Md5::digest(PAYLOAD.as_bytes()));
    let md5sums = fs::read_to_string(config.info_dir().join("test.md5sums"))?;
    assert_eq!(
        md5sums,
        format!(
            "{}  {}\n",
            md5,
            installed_file.display().to_string().trim_start_matches('/')
        )
    );

    let script = fs::read_to_string(config.info_dir().join("test.preinst"))?;
    assert_eq!(script, preinst);

    // Reloading the database shows the record installed, with every
    // recorded file present and matching its digest.
    let db = Database::load(&config.var_dir)?;
    let record = &db.packages[db.position("test").unwrap()];
    assert_eq!(record.status, PackageStatus::Installed);
    for (path, digest) in &record.md5sums {
        let content = fs::read(path)?;
        assert_eq!(&hex::encode(Md5::digest(&content)), digest);
    }

    Ok(())
}

#[test]
fn conffiles_are_staged_then_promoted() -> Result<()> {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let config = Config::with_root(root);

    seed_dpkg_database(&config, "");

    let conffile = root.join("etc/foo.conf");
    let control = "\
Package: conftest
Version: 1.0
Architecture: all
Description: Conffile staging test
";

    let staging = root.join("1.0");
    let root_relative = root.strip_prefix("/").unwrap_or(root);
    fs::create_dir_all(staging.join("DEBIAN")).unwrap();
    fs::write(staging.join("DEBIAN/control"), control).unwrap();
    fs::write(
        staging.join("DEBIAN/conffiles"),
        format!("{}\n", conffile.display()),
    )
    .unwrap();
    let etc_dir = staging.join(root_relative).join("etc");
    fs::create_dir_all(&etc_dir).unwrap();
    fs::write(etc_dir.join("foo.conf"), "option = 1\n").unwrap();

    let archive = root.join("conftest.deb");
    build_package(&staging, &archive)?;

    // Drive the lifecycle by hand to observe the staging step.
    let (control_tar, data_tar) = read_package(&archive)?;
    let mut db = Database::load(&config.var_dir)?;
    db.packages
        .push(PackageInfo::from_control_tar(&config.var_dir, &control_tar)?);
    let index = db.packages.len() - 1;
    db.sync()?;

    db.unpack(index, &data_tar)?;
    let staged = root.join("etc/foo.conf.dpkg-new");
    assert!(staged.exists());
    assert!(!conffile.exists());

    db.configure(index)?;
    assert!(!staged.exists());
    assert_eq!(fs::read_to_string(&conffile)?, "option = 1\n");

    let status = fs::read_to_string(config.status_file())?;
    assert!(status.contains("Package: conftest"));
    assert!(status.contains("Status: install ok installed"));

    Ok(())
}

#[test]
fn failing_preinst_leaves_record_unchanged() -> Result<()> {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let config = Config::with_root(root);

    seed_dpkg_database(&config, "");

    let control = "\
Package: broken
Version: 1.0
Architecture: all
Description: Always fails
";
    let staging = stage_package(root, control, &[("preinst", "#!/bin/sh\nexit 3\n".to_string())]);
    let archive = root.join("broken.deb");
    build_package(&staging, &archive)?;

    assert!(installer::install_archives(&config, &[&archive]).is_err());

    // The payload was never written and the record never advanced.
    assert!(!root.join("out/test").exists());
    let status = fs::read_to_string(config.status_file())?;
    assert!(status.contains("Status: install ok non-installed"));

    Ok(())
}
