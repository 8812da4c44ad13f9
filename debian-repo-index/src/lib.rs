// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository indexing.

This crate turns a directory of `.deb` files into an APT repository that clients
can add to their `sources.list`. It is pure Rust except for signing, which
delegates to `gpg`.

# Goals

## Determinism

Given the same input packages and the same `Date`, a build produces byte-for-byte
identical index files. Packages are processed in sorted order and every listing
written to disk is sorted.

## Fail Fast

Every stage returns a [error::Result]. An unusable input directory is reported
before anything is written. A malformed package or an I/O failure aborts the
build. Signing is the one best-effort stage: when it fails, the repository is
still complete, just unsigned.

# A Tour of Functionality

A common primitive within Debian packaging is *control files*. These consist of
*paragraphs* of key-value metadata. Low-level control file primitives are defined
in the [control] module. [control::ControlParagraph] defines a paragraph, which
consists of [control::ControlField]. [control::ControlParagraphReader] implements
a streaming reader of control files.
[binary_package_control::BinaryPackageControlFile] wraps the paragraph of a
binary package and [binary_package_control::Architecture] enumerates the
architectures a repository can hold.

The [deb] module deals with `.deb` files. The [deb::PackageInspector] trait
yields the control text and installed paths of a package.
[deb::reader::DebFileInspector] implements it with native `ar` and `tar`
readers. [deb::builder::DebBuilder] creates `.deb` files.

The [io] module computes content digests ([io::MultiDigester],
[io::digest_path()]) and compresses index files ([io::Compression]).

The [repository] module builds repositories. [repository::builder::RepositoryBuilder]
is the main type, configured by [repository::builder::RepositoryBuilderConfig].
It drives [repository::tree] (placing packages), [repository::packages]
(`Packages` files) and [repository::manifest] (the `Release` file).
[repository::release::ReleaseFile] and [repository::contents::ContentsFile] parse
the generated files back.

The [signing] module defines the [signing::ReleaseSigner] trait producing
`InRelease` files and [signing::GpgSigner], its `gpg` implementation.
*/

pub mod binary_package_control;
pub mod control;
pub mod deb;
pub mod error;
pub mod io;
pub mod repository;
pub mod signing;
