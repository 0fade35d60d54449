// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {path}: {error:?}")]
    IoPath {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0:?}")]
    Http(#[from] reqwest::Error),

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("control file lacks a paragraph")]
    ControlNoParagraph,

    #[error("package {package} lacks control field {field}")]
    MissingControlField { package: String, field: String },

    #[error("package archive lacks a control member")]
    DebMissingControl,

    #[error("unexpected member in package archive: {0}")]
    DebUnexpectedMember(String),

    #[error("unsupported package archive format version: {0:?}")]
    DebFormatVersion(String),

    #[error("unknown compression in package archive member: {0}")]
    DebUnknownCompression(String),

    #[error("malformed sources line: {0}")]
    SourcesParse(String),

    #[error("unable to locate package {0}")]
    PackageNotFound(String),

    #[error("no cached archive for package {0}")]
    ArchiveMissing(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {got}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("signature verification failed for {path}: {reason}")]
    SignatureVerification { path: String, reason: String },

    #[error("conffile {0} is missing")]
    ConffileMissing(String),

    #[error("maintainer script {script} failed: {reason}")]
    MaintainerScript { script: String, reason: String },

    #[error("unknown package status: {0}")]
    UnknownStatus(String),

    #[error("unable to fetch resources:\n{0}")]
    Acquire(String),

    #[error("errors were encountered while processing:\n\t{0}")]
    InstallationFailed(String),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, DebError>;
