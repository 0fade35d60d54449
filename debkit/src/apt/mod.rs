// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The `apt install` flow.

Composes the other subsystems: open the cache (fetch and verify repository
metadata), resolve the requested packages into an install order, download
the archives, then hand the ordered archive list to the installer.
*/

use {
    crate::{
        apt::{
            acquire::Acquire,
            cache::{CacheFile, Package},
            item::PackageItem,
        },
        config::Config,
        database::package::PackageInfo,
        deb::reader::read_control_tar,
        error::{DebError, Result},
        installer,
    },
    std::{
        fs,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

pub mod acquire;
pub mod cache;
pub mod item;

/// Install the named packages.
///
/// Arguments ending in `.deb` are registered from the local archive; other
/// arguments are resolved against the repository catalog.
pub async fn install(config: Config, args: &[String]) -> Result<()> {
    let mut cache = CacheFile::new(config);
    cache.open().await?;

    let mut requested = Vec::new();
    for arg in args {
        let name = if arg.ends_with(".deb") {
            register_local_package(&cache, Path::new(arg))?
        } else {
            arg.clone()
        };

        cache.mark_for_installation(&name)?;
        requested.push(name);
    }

    print_extra_packages(&cache, &requested);
    print_suggested_packages(&cache);

    install_packages(&cache).await
}

/// Register a local archive in the catalog, returning its package name.
fn register_local_package(cache: &CacheFile, path: &Path) -> Result<String> {
    let control_tar = read_control_tar(path).map_err(|_| {
        DebError::PackageNotFound(path.display().to_string())
    })?;
    let info = PackageInfo::from_control_tar(&cache.config.var_dir, &control_tar)?;

    let package = Package {
        paragraph: info.paragraph.clone(),
        source: None,
        local_path: Some(path.to_path_buf()),
        archive_path: None,
    };
    let name = info.name().to_string();

    cache
        .catalog
        .lock()
        .expect("catalog lock")
        .add_package(package);

    Ok(name)
}

/// Report packages pulled in beyond the ones explicitly requested.
fn print_extra_packages(cache: &CacheFile, requested: &[String]) {
    if cache.inst_count() == requested.len() {
        return;
    }

    let catalog = cache.catalog.lock().expect("catalog lock");
    let extras = catalog
        .package_names()
        .into_iter()
        .filter(|name| {
            cache.state(name).map(|state| state.install()).unwrap_or(false)
                && !requested.contains(name)
        })
        .collect::<Vec<_>>();

    if !extras.is_empty() {
        println!(
            "The following additional packages will be installed:\n\t{}",
            extras.join(" ")
        );
    }
}

/// Report the suggestions of every package about to be installed.
fn print_suggested_packages(cache: &CacheFile) {
    let catalog = cache.catalog.lock().expect("catalog lock");

    let mut suggests = Vec::new();
    for name in catalog.package_names() {
        if !cache.state(&name).map(|state| state.install()).unwrap_or(false) {
            continue;
        }
        if let Some(package) = catalog.package(&name) {
            suggests.extend(package.suggests().into_iter().map(|dep| dep.name));
        }
    }

    if !suggests.is_empty() {
        println!("Suggested packages:\n\t{}", suggests.join(" "));
    }
}

/// Stage every ordered package into the archive cache, then install.
async fn install_packages(cache: &CacheFile) -> Result<()> {
    let config = cache.config.clone();
    let order = cache.install_order().to_vec();

    let acquire = Acquire::new(cache.catalog.clone());

    let mut items = Vec::new();
    {
        let mut catalog = cache.catalog.lock().expect("catalog lock");

        for name in &order {
            let source_uri = catalog
                .package(name)
                .and_then(|package| package.source)
                .map(|id| catalog.sources[id].uri.clone());

            let package = catalog
                .package_mut(name)
                .ok_or_else(|| DebError::PackageNotFound(name.clone()))?;

            if let Some(local) = package.local_path.clone() {
                // A user-supplied archive: copy it into the cache under its
                // canonical name.
                let dest = config.archives_dir().join(format!(
                    "{}_{}_{}.deb",
                    package.name(),
                    package.version(),
                    package.architecture()
                ));
                fs::create_dir_all(config.archives_dir())?;
                fs::copy(&local, &dest).map_err(|error| DebError::IoPath {
                    path: local.clone(),
                    error,
                })?;
                package.archive_path = Some(dest);
            } else {
                let source_uri = source_uri
                    .ok_or_else(|| DebError::PackageNotFound(name.clone()))?;
                items.push(Arc::new(PackageItem::new(
                    config.clone(),
                    package,
                    &source_uri,
                )?));
            }
        }
    }

    for item in items {
        acquire.add(item);
    }
    acquire.run().await?;

    let archives = {
        let catalog = cache.catalog.lock().expect("catalog lock");
        order
            .iter()
            .map(|name| {
                catalog
                    .package(name)
                    .and_then(|package| package.archive_path.clone())
                    .ok_or_else(|| DebError::ArchiveMissing(name.clone()))
            })
            .collect::<Result<Vec<PathBuf>>>()?
    };

    installer::install_archives(config.as_ref(), &archives)
}
