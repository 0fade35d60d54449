// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Downloadable repository items.

Three item kinds drive a fetch session:

* [MetaIndexItem]: the clearsigned `InRelease` document. Verifying it
  yields the expected MD5 of every other index file and enqueues the
  `Packages` indices to fetch.
* [IndexItem]: a `Packages.xz` index. Verified against the `InRelease`
  entry, decompressed, and ingested into the catalog.
* [PackageItem]: a `.deb` archive, verified against the index paragraph's
  SHA-256 and left in the archive cache for the installer.

Items never hold the catalog; it is passed into `done`.
*/

use {
    crate::{
        apt::{
            acquire::{AcquireHandle, Item},
            cache::{escaped_uri, Catalog, Package, Source},
        },
        config::Config,
        control::ControlFile,
        error::{DebError, Result},
        signatures,
    },
    async_trait::async_trait,
    md5::{Digest, Md5},
    sha2::Sha256,
    std::{
        fmt,
        io::Read,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    },
    xz2::read::XzDecoder,
};

/// The clearsigned `InRelease` document for one source.
pub struct MetaIndexItem {
    config: Arc<Config>,
    source: usize,
    uri: String,
    dist: String,
}

impl MetaIndexItem {
    pub fn new(config: Arc<Config>, source_id: usize, source: &Source) -> Self {
        Self {
            config,
            source: source_id,
            uri: source.uri.clone(),
            dist: source.dist.clone(),
        }
    }
}

impl fmt::Display for MetaIndexItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} InRelease", self.uri, self.dist)
    }
}

#[async_trait]
impl Item for MetaIndexItem {
    fn download_uri(&self) -> String {
        format!("{}/dists/{}/InRelease", self.uri, self.dist)
    }

    fn dest_file(&self, _uri: &str) -> PathBuf {
        self.config
            .lists_dir()
            .join(format!("{}.{}_InRelease", escaped_uri(&self.uri), self.dist))
    }

    async fn done(&self, catalog: &Mutex<Catalog>, acquire: &AcquireHandle) -> Result<()> {
        let path = self.dest_file(&self.uri);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|error| DebError::IoPath {
                path: path.clone(),
                error,
            })?;

        let keyring = self.config.keyring_file(&self.dist);
        let plaintext =
            signatures::verify_clearsigned(&data, &keyring).map_err(|error| match error {
                DebError::SignatureVerification { reason, .. } => {
                    DebError::SignatureVerification {
                        path: path.display().to_string(),
                        reason,
                    }
                }
                other => other,
            })?;

        let text = String::from_utf8_lossy(&plaintext).replace("\r\n", "\n");
        let release = ControlFile::parse_str(&text)?;
        let paragraph = release
            .into_paragraphs()
            .next()
            .ok_or(DebError::ControlNoParagraph)?;

        {
            let mut catalog = catalog.lock().expect("catalog lock");
            let source = &mut catalog.sources[self.source];

            source.codename = paragraph.field_str("Codename").unwrap_or_default().into();
            source.suite = paragraph.field_str("Suite").unwrap_or_default().into();
            source.origin = paragraph.field_str("Origin").unwrap_or_default().into();
            source.label = paragraph.field_str("Label").unwrap_or_default().into();

            source.entries.clear();
            if let Some(field) = paragraph.field("MD5Sum") {
                // Each line: <md5> <size> <relative-path>.
                for line in field.iter_lines() {
                    let mut fields = line.split_whitespace();
                    if let (Some(md5), Some(_size), Some(relative)) =
                        (fields.next(), fields.next(), fields.next())
                    {
                        source.entries.insert(relative.to_string(), md5.to_string());
                    }
                }
            }

            source.release = Some(paragraph);
        }

        // Only the main/amd64 binary index is fetched.
        acquire.add(Arc::new(IndexItem::new(
            self.config.clone(),
            self.source,
            &self.uri,
            &self.dist,
            "main",
            "amd64",
        )));

        Ok(())
    }
}

/// A binary `Packages` index for one (component, architecture) pair.
pub struct IndexItem {
    config: Arc<Config>,
    source: usize,
    uri: String,
    dist: String,
    component: String,
    architecture: String,
}

impl IndexItem {
    pub fn new(
        config: Arc<Config>,
        source_id: usize,
        uri: &str,
        dist: &str,
        component: &str,
        architecture: &str,
    ) -> Self {
        Self {
            config,
            source: source_id,
            uri: uri.to_string(),
            dist: dist.to_string(),
            component: component.to_string(),
            architecture: architecture.to_string(),
        }
    }

    /// The key for this file in the `InRelease` entry table.
    pub fn entry_name(&self) -> String {
        format!(
            "{}/binary-{}/Packages.xz",
            self.component, self.architecture
        )
    }
}

impl fmt::Display for IndexItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} {} Packages",
            self.uri, self.dist, self.component, self.architecture
        )
    }
}

#[async_trait]
impl Item for IndexItem {
    fn download_uri(&self) -> String {
        format!(
            "{}/dists/{}/{}/binary-{}/Packages.xz",
            self.uri, self.dist, self.component, self.architecture
        )
    }

    fn dest_file(&self, _uri: &str) -> PathBuf {
        self.config.lists_dir().join(format!(
            "{}.{}_{}_binary-{}_Packages.xz",
            escaped_uri(&self.uri),
            self.dist,
            self.component,
            self.architecture
        ))
    }

    async fn done(&self, catalog: &Mutex<Catalog>, _acquire: &AcquireHandle) -> Result<()> {
        let path = self.dest_file(&self.uri);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|error| DebError::IoPath {
                path: path.clone(),
                error,
            })?;

        // The raw bytes must match the MD5 advertised by InRelease.
        let digest = hex::encode(Md5::digest(&data));
        let expected = {
            let catalog = catalog.lock().expect("catalog lock");
            catalog.sources[self.source]
                .entries
                .get(&self.entry_name())
                .cloned()
                .unwrap_or_default()
        };
        if digest != expected {
            return Err(DebError::ChecksumMismatch {
                path: path.display().to_string(),
                expected,
                got: digest,
            });
        }

        let mut content = String::new();
        XzDecoder::new(data.as_slice()).read_to_string(&mut content)?;

        let document = ControlFile::parse_str(&content)?;

        let mut catalog = catalog.lock().expect("catalog lock");
        for paragraph in document.into_paragraphs() {
            catalog.add_package(Package {
                paragraph,
                source: Some(self.source),
                local_path: None,
                archive_path: None,
            });
        }

        Ok(())
    }
}

/// A binary package archive destined for the archive cache.
pub struct PackageItem {
    config: Arc<Config>,
    name: String,
    version: String,
    architecture: String,
    uri: String,
    filename: String,
    sha256: String,
}

impl PackageItem {
    /// Build an item from a catalog entry and its source base URI.
    pub fn new(config: Arc<Config>, package: &Package, source_uri: &str) -> Result<Self> {
        let filename = package
            .paragraph
            .field_str("Filename")
            .ok_or_else(|| DebError::MissingControlField {
                package: package.name().to_string(),
                field: "Filename".to_string(),
            })?
            .to_string();
        let sha256 = package
            .paragraph
            .field_str("SHA256")
            .ok_or_else(|| DebError::MissingControlField {
                package: package.name().to_string(),
                field: "SHA256".to_string(),
            })?
            .to_string();

        Ok(Self {
            config,
            name: package.name().to_string(),
            version: package.version().to_string(),
            architecture: package.architecture().to_string(),
            uri: source_uri.to_string(),
            filename,
            sha256,
        })
    }
}

impl fmt::Display for PackageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.uri, self.name, self.architecture, self.version
        )
    }
}

#[async_trait]
impl Item for PackageItem {
    fn download_uri(&self) -> String {
        format!("{}/{}", self.uri, self.filename)
    }

    fn dest_file(&self, uri: &str) -> PathBuf {
        let basename = Path::new(uri)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone());

        self.config.archives_dir().join(basename)
    }

    async fn done(&self, catalog: &Mutex<Catalog>, _acquire: &AcquireHandle) -> Result<()> {
        let path = self.dest_file(&self.download_uri());
        let data = tokio::fs::read(&path)
            .await
            .map_err(|error| DebError::IoPath {
                path: path.clone(),
                error,
            })?;

        let digest = hex::encode(Sha256::digest(&data));
        if digest != self.sha256 {
            return Err(DebError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: self.sha256.clone(),
                got: digest,
            });
        }

        let mut catalog = catalog.lock().expect("catalog lock");
        if let Some(package) = catalog.package_mut(&self.name) {
            package.archive_path = Some(path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::apt::{acquire::Acquire, cache::SourceKind},
        std::io::Write,
    };

    fn test_source(uri: &str, dist: &str) -> Source {
        Source {
            kind: SourceKind::Deb,
            uri: uri.to_string(),
            dist: dist.to_string(),
            components: vec!["main".to_string()],
            codename: String::new(),
            suite: String::new(),
            origin: String::new(),
            label: String::new(),
            entries: std::collections::HashMap::new(),
            release: None,
        }
    }

    #[test]
    fn meta_index_uri_and_dest() {
        let config = Arc::new(Config::with_root("/sandbox"));
        let source = test_source("http://deb.debian.org/debian", "buster");
        let item = MetaIndexItem::new(config, 0, &source);

        assert_eq!(
            item.download_uri(),
            "http://deb.debian.org/debian/dists/buster/InRelease"
        );
        assert_eq!(
            item.dest_file(&item.download_uri()),
            PathBuf::from(
                "/sandbox/var/lib/apt/lists/deb.debian.org_debian.buster_InRelease"
            )
        );
    }

    #[test]
    fn index_uri_dest_and_entry_name() {
        let config = Arc::new(Config::with_root("/sandbox"));
        let item = IndexItem::new(
            config,
            0,
            "http://deb.debian.org/debian",
            "buster",
            "main",
            "amd64",
        );

        assert_eq!(
            item.download_uri(),
            "http://deb.debian.org/debian/dists/buster/main/binary-amd64/Packages.xz"
        );
        assert_eq!(item.entry_name(), "main/binary-amd64/Packages.xz");
        assert_eq!(
            item.dest_file(&item.download_uri()),
            PathBuf::from(
                "/sandbox/var/lib/apt/lists/deb.debian.org_debian.buster_main_binary-amd64_Packages.xz"
            )
        );
    }

    fn package_index_xz(text: &str) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn seeded_catalog_with_index(
        config: &Config,
        index_md5: &str,
        index_bytes: &[u8],
    ) -> (Arc<Mutex<Catalog>>, IndexItem) {
        let mut source = test_source("http://deb.debian.org/debian", "buster");
        source
            .entries
            .insert("main/binary-amd64/Packages.xz".to_string(), index_md5.to_string());

        let mut catalog = Catalog::default();
        catalog.sources.push(source);
        let catalog = Arc::new(Mutex::new(catalog));

        let item = IndexItem::new(
            Arc::new(config.clone()),
            0,
            "http://deb.debian.org/debian",
            "buster",
            "main",
            "amd64",
        );

        let dest = item.dest_file(&item.download_uri());
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, index_bytes).unwrap();

        (catalog, item)
    }

    const INDEX_TEXT: &str =
        "Package: rsync\nVersion: 3.1.3-6\nArchitecture: amd64\nFilename: pool/main/r/rsync/rsync_3.1.3-6_amd64.deb\nSHA256: 0011\n";

    #[tokio::test(flavor = "multi_thread")]
    async fn index_with_matching_md5_populates_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let index = package_index_xz(INDEX_TEXT);
        let md5 = hex::encode(Md5::digest(&index));

        let (catalog, item) = seeded_catalog_with_index(&config, &md5, &index);
        let acquire = Acquire::new(catalog.clone());

        item.done(&catalog, &acquire.handle()).await.unwrap();

        let catalog = catalog.lock().unwrap();
        assert_eq!(catalog.len(), 1);
        let rsync = catalog.package("rsync").unwrap();
        assert_eq!(rsync.version(), "3.1.3-6");
        assert_eq!(rsync.source, Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn index_md5_mismatch_is_fatal_and_adds_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let index = package_index_xz(INDEX_TEXT);

        let (catalog, item) =
            seeded_catalog_with_index(&config, "00000000000000000000000000000000", &index);
        let acquire = Acquire::new(catalog.clone());

        let result = item.done(&catalog, &acquire.handle()).await;

        assert!(matches!(result, Err(DebError::ChecksumMismatch { .. })));
        assert!(catalog.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn package_item_verifies_sha256() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::with_root(tmp.path()));

        let archive = b"not really a deb";
        let sha256 = hex::encode(Sha256::digest(archive));

        let mut paragraph = crate::control::ControlParagraph::default();
        paragraph.set_field("Package", "rsync".to_string());
        paragraph.set_field("Version", "3.1.3-6".to_string());
        paragraph.set_field("Architecture", "amd64".to_string());
        paragraph.set_field(
            "Filename",
            "pool/main/r/rsync/rsync_3.1.3-6_amd64.deb".to_string(),
        );
        paragraph.set_field("SHA256", sha256.clone());

        let package = Package {
            paragraph,
            source: Some(0),
            local_path: None,
            archive_path: None,
        };

        let mut catalog = Catalog::default();
        catalog.sources.push(test_source("http://deb.debian.org/debian", "buster"));
        catalog.add_package(package.clone());
        let catalog = Arc::new(Mutex::new(catalog));

        let item = PackageItem::new(config, &package, "http://deb.debian.org/debian").unwrap();
        assert_eq!(
            item.download_uri(),
            "http://deb.debian.org/debian/pool/main/r/rsync/rsync_3.1.3-6_amd64.deb"
        );

        let dest = item.dest_file(&item.download_uri());
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        assert!(dest.ends_with("var/cache/apt/archives/rsync_3.1.3-6_amd64.deb"));
        std::fs::write(&dest, archive).unwrap();

        let acquire = Acquire::new(catalog.clone());
        item.done(&catalog, &acquire.handle()).await.unwrap();
        assert_eq!(
            catalog
                .lock()
                .unwrap()
                .package("rsync")
                .unwrap()
                .archive_path
                .clone(),
            Some(dest.clone())
        );

        // Corrupt the cached archive; verification must now fail.
        std::fs::write(&dest, b"tampered").unwrap();
        assert!(matches!(
            item.done(&catalog, &acquire.handle()).await,
            Err(DebError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn missing_index_fields_fail_item_construction() {
        let config = Arc::new(Config::default());
        let mut paragraph = crate::control::ControlParagraph::default();
        paragraph.set_field("Package", "rsync".to_string());

        let package = Package {
            paragraph,
            source: Some(0),
            local_path: None,
            archive_path: None,
        };

        assert!(matches!(
            PackageItem::new(config, &package, "http://deb.debian.org/debian"),
            Err(DebError::MissingControlField { .. })
        ));
    }
}
