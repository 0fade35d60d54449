// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian packaging and installation primitives.

This crate reimplements the core of the Debian package toolchain in pure
Rust: building and installing `.deb` archives against a dpkg-style local
database, and resolving, fetching and verifying packages from APT
repositories.

# A Tour of Functionality

A `.deb` file is an `ar` archive wrapping two tar streams. [deb::builder]
creates archives from a staging directory and [deb::reader] consumes them.

Package metadata everywhere (control members, `Packages` indices,
`InRelease` documents, the dpkg `status` file) is the same paragraph
format. [control] provides the ordered-field [control::ControlParagraph]
and streaming readers over it. [dependency] parses the relationship meta
language (`libc6 (>= 2.15), gpgv | gpgv2`).

The local package database lives in [database]: [database::Database] loads
and rewrites the `status` document and per-package info files, and drives
the unpack/configure lifecycle so every status transition is persisted.

Repository interaction lives in [apt]: [apt::acquire::Acquire] is a
two-worker download pool, [apt::item] defines the `InRelease` / `Packages`
/ archive items with their integrity checks, and [apt::cache::CacheFile]
holds the catalog and the recursive install marker. [apt::install] is the
complete `apt install` flow; [installer::install_archives] is the
`dpkg --install` driver both paths end in.

[signatures] verifies clearsigned repository indices against a binary
keyring. [config::Config] carries the filesystem roots everything above
operates under.

# Security

Maintainer scripts are executed with the caller's privileges and no
sandbox. Installing a package you do not trust is arbitrary code
execution.
*/

pub mod apt;
pub mod config;
pub mod control;
pub mod database;
pub mod deb;
pub mod dependency;
pub mod error;
pub mod installer;
pub mod signatures;
