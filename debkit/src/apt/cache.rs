// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The package cache, configured sources and dependency resolution. */

use {
    crate::{
        apt::{acquire::Acquire, item::MetaIndexItem},
        config::Config,
        control::{ControlParagraph, ControlParagraphReader},
        dependency::{parse_dependencies, Dependency},
        error::{DebError, Result},
    },
    log::debug,
    std::{
        collections::HashMap,
        fs,
        io::BufReader,
        path::PathBuf,
        sync::{Arc, Mutex},
    },
    url::Url,
};

/// Repository type of a sources.list line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    /// Binary packages.
    Deb,
    /// Source packages; ignored by the fetcher.
    DebSrc,
}

/// One configured package repository.
#[derive(Clone, Debug)]
pub struct Source {
    pub kind: SourceKind,
    pub uri: String,
    pub dist: String,
    /// Component names after the distribution; parsed but not consulted.
    pub components: Vec<String>,

    // Populated once the verified InRelease document is processed.
    pub codename: String,
    pub suite: String,
    pub origin: String,
    pub label: String,
    /// Expected MD5 per relative index path, from the `MD5Sum` field.
    pub entries: HashMap<String, String>,
    pub release: Option<ControlParagraph>,
}

impl Source {
    /// The URI escaped for use in `lists/` cache filenames.
    pub fn escaped_uri(&self) -> String {
        escaped_uri(&self.uri)
    }
}

/// Escape a repository URI for use as a filename fragment.
pub fn escaped_uri(uri: &str) -> String {
    uri.trim_start_matches("http://").replace('/', "_")
}

/// Parse one sources-list document.
///
/// Lines are `<type> <uri> <dist> [components…]`; blank lines and `#`
/// comments are skipped.
pub fn parse_sources(content: &str) -> Result<Vec<Source>> {
    let mut sources = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (kind, uri, dist) = match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(uri), Some(dist)) => (kind, uri, dist),
            _ => return Err(DebError::SourcesParse(line.to_string())),
        };

        let kind = match kind {
            "deb" => SourceKind::Deb,
            "deb-src" => SourceKind::DebSrc,
            _ => return Err(DebError::SourcesParse(line.to_string())),
        };

        Url::parse(uri).map_err(|_| DebError::SourcesParse(line.to_string()))?;

        sources.push(Source {
            kind,
            uri: uri.to_string(),
            dist: dist.to_string(),
            components: parts.map(str::to_string).collect(),
            codename: String::new(),
            suite: String::new(),
            origin: String::new(),
            label: String::new(),
            entries: HashMap::new(),
            release: None,
        });
    }

    Ok(sources)
}

/// One candidate package known from repository indices or a local archive.
#[derive(Clone, Debug)]
pub struct Package {
    /// The index (or control) paragraph describing the package.
    pub paragraph: ControlParagraph,
    /// Index of the providing source in the catalog's source table.
    pub source: Option<usize>,
    /// Path of a user-supplied local archive, if any.
    pub local_path: Option<PathBuf>,
    /// Path of the downloaded archive under the archive cache.
    pub archive_path: Option<PathBuf>,
}

impl Package {
    pub fn name(&self) -> &str {
        self.paragraph.field_str("Package").unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.paragraph.field_str("Version").unwrap_or_default()
    }

    pub fn architecture(&self) -> &str {
        self.paragraph.field_str("Architecture").unwrap_or_default()
    }

    pub fn depends(&self) -> Vec<Dependency> {
        parse_dependencies(self.paragraph.field_str("Depends").unwrap_or_default())
    }

    pub fn suggests(&self) -> Vec<Dependency> {
        parse_dependencies(self.paragraph.field_str("Suggests").unwrap_or_default())
    }
}

/// The in-memory package catalog.
///
/// Shared with the acquire pool, whose `done` callbacks populate it from
/// worker tasks; all access goes through one mutex.
#[derive(Debug, Default)]
pub struct Catalog {
    pub sources: Vec<Source>,
    packages: HashMap<String, Package>,
}

impl Catalog {
    /// Insert or replace a catalog entry.
    pub fn add_package(&mut self, package: Package) {
        self.packages.insert(package.name().to_string(), package);
    }

    /// Look up a package by name.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Look up a package by name, mutably.
    pub fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.get_mut(name)
    }

    /// All catalog package names, sorted.
    pub fn package_names(&self) -> Vec<String> {
        let mut names = self.packages.keys().cloned().collect::<Vec<_>>();
        names.sort();

        names
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Per-package resolution state for one install session.
#[derive(Clone, Debug, Default)]
pub struct StateCache {
    /// Version available from the indices; empty when not in any repo.
    pub candidate_version: String,
    /// Version recorded in the local database; empty when not installed.
    pub current_version: String,
    flag_install: bool,
}

impl StateCache {
    pub fn installed(&self) -> bool {
        !self.current_version.is_empty()
    }

    pub fn upgradable(&self) -> bool {
        !self.current_version.is_empty()
            && !self.candidate_version.is_empty()
            && self.current_version != self.candidate_version
    }

    pub fn install(&self) -> bool {
        self.flag_install
    }
}

/// The session cache: sources, shared catalog and dependency state.
pub struct CacheFile {
    pub config: Arc<Config>,
    pub catalog: Arc<Mutex<Catalog>>,
    states: HashMap<String, StateCache>,
    order: Vec<String>,
}

impl CacheFile {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(Mutex::new(Catalog::default())),
            states: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Fetch and verify repository metadata, then build dependency state.
    pub async fn open(&mut self) -> Result<()> {
        self.build_source_list()?;

        let acquire = Acquire::new(self.catalog.clone());
        let items = {
            let catalog = self.catalog.lock().expect("catalog lock");
            catalog
                .sources
                .iter()
                .enumerate()
                .filter(|(_, source)| source.kind == SourceKind::Deb)
                .map(|(id, source)| MetaIndexItem::new(self.config.clone(), id, source))
                .collect::<Vec<_>>()
        };
        for item in items {
            acquire.add(Arc::new(item));
        }
        acquire.run().await?;

        self.build_dep_cache()
    }

    /// Read `sources.list` and `sources.list.d/` into the catalog.
    fn build_source_list(&mut self) -> Result<()> {
        let mut sources = Vec::new();

        let main = self.config.sources_list();
        if main.exists() {
            let content = fs::read_to_string(&main).map_err(|error| DebError::IoPath {
                path: main,
                error,
            })?;
            sources.extend(parse_sources(&content)?);
        }

        let dir = self.config.sources_list_dir();
        if dir.exists() {
            let mut files = fs::read_dir(&dir)
                .map_err(|error| DebError::IoPath { path: dir, error })?
                .collect::<std::io::Result<Vec<_>>>()?;
            files.sort_by_key(|entry| entry.file_name());

            for file in files {
                let path = file.path();
                let content = fs::read_to_string(&path).map_err(|error| DebError::IoPath {
                    path,
                    error,
                })?;
                sources.extend(parse_sources(&content)?);
            }
        }

        debug!("configured {} package sources", sources.len());

        self.catalog.lock().expect("catalog lock").sources = sources;

        Ok(())
    }

    /// Build the per-package state map from the catalog and the local
    /// database's status file.
    fn build_dep_cache(&mut self) -> Result<()> {
        let mut states: HashMap<String, StateCache> = HashMap::new();

        {
            let catalog = self.catalog.lock().expect("catalog lock");
            for name in catalog.package_names() {
                let candidate = catalog
                    .package(&name)
                    .map(|p| p.version().to_string())
                    .unwrap_or_default();
                states.insert(
                    name,
                    StateCache {
                        candidate_version: candidate,
                        ..Default::default()
                    },
                );
            }
        }

        let status_path = self.config.status_file();
        let file = fs::File::open(&status_path).map_err(|error| DebError::IoPath {
            path: status_path,
            error,
        })?;
        for paragraph in ControlParagraphReader::new(BufReader::new(file)) {
            let paragraph = paragraph?;
            let name = paragraph.field_str("Package").unwrap_or_default().to_string();
            let current = paragraph.field_str("Version").unwrap_or_default().to_string();
            states.entry(name).or_default().current_version = current;
        }

        self.states = states;

        Ok(())
    }

    /// Recursively mark a package and its dependencies for installation.
    ///
    /// Appends to the install order after all dependencies, producing a
    /// reverse-topological ordering. Packages already installed or already
    /// marked terminate the recursion, including dependency cycles.
    pub fn mark_for_installation(&mut self, name: &str) -> Result<()> {
        let catalog = self.catalog.clone();
        let catalog = catalog.lock().expect("catalog lock");

        Self::mark_recursive(&catalog, &mut self.states, &mut self.order, name)
    }

    fn mark_recursive(
        catalog: &Catalog,
        states: &mut HashMap<String, StateCache>,
        order: &mut Vec<String>,
        name: &str,
    ) -> Result<()> {
        let package = catalog
            .package(name)
            .ok_or_else(|| DebError::PackageNotFound(name.to_string()))?;
        let dependencies = package.depends();

        {
            let state = states.entry(name.to_string()).or_default();
            if state.installed() || state.install() {
                return Ok(());
            }

            // Mark before descending so cycles terminate.
            state.candidate_version = package.version().to_string();
            state.flag_install = true;
        }

        for dependency in dependencies {
            Self::mark_recursive(catalog, states, order, &dependency.name)?;
        }

        order.push(name.to_string());

        Ok(())
    }

    /// The resolved installation order.
    pub fn install_order(&self) -> &[String] {
        &self.order
    }

    /// Resolution state of a package, if known.
    pub fn state(&self, name: &str) -> Option<&StateCache> {
        self.states.get(name)
    }

    /// Number of packages marked for installation.
    pub fn inst_count(&self) -> usize {
        self.states.values().filter(|state| state.install()).count()
    }
}
