// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository primitives.

A Debian repository is a collection of files holding packages and other
support primitives. See <https://wiki.debian.org/DebianRepository/Format>
for the canonical definition of a Debian repository.

Repositories are built in three passes over a local directory tree:

1. [tree] places every package into `<component>/binary-<arch>/` and appends its
   installed paths to the component's `Contents-<arch>` file.
2. [packages] writes `Packages` and `Packages.xz` for every `binary-<arch>`
   directory of the components touched by the first pass.
3. [manifest] writes the `Release` file covering every index file of every
   component on disk.

[builder::RepositoryBuilder] drives these passes.
*/

pub mod builder;
pub mod contents;
pub mod filesystem;
pub mod manifest;
pub mod packages;
pub mod release;
pub mod tree;

/// Describes an event during repository building.
///
/// Events are emitted to an optional progress callback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildEvent {
    /// Number of package files discovered in the input directory.
    PackagesDiscovered(usize),

    /// A component was seen for the first time and its directory was reset.
    ComponentReset(String),

    /// A package was placed in the tree at the given path, with the given size.
    PackagePlaced(String, u64),

    /// Rows were appended to a `Contents` file.
    ContentsRowsAppended(String, usize),

    /// An index file was written with the given size.
    IndexFileWritten(String, u64),

    /// The `Release` file was written.
    ReleaseWritten(String),

    /// The `Release` file was signed, producing the given file.
    ReleaseSigned(String),

    /// Signing the `Release` file failed. The build continues.
    SigningFailed(String),
}

impl std::fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PackagesDiscovered(count) => {
                write!(f, "found {} packages", count)
            }
            Self::ComponentReset(component) => {
                write!(f, "component {} will be rebuilt", component)
            }
            Self::PackagePlaced(path, size) => {
                write!(f, "placed {} ({} bytes)", path, size)
            }
            Self::ContentsRowsAppended(path, count) => {
                write!(f, "appended {} rows to {}", count, path)
            }
            Self::IndexFileWritten(path, size) => {
                write!(f, "wrote {} bytes to {}", size, path)
            }
            Self::ReleaseWritten(path) => {
                write!(f, "wrote release file {}", path)
            }
            Self::ReleaseSigned(path) => {
                write!(f, "signed release file to {}", path)
            }
            Self::SigningFailed(message) => {
                write!(f, "signing failed: {}", message)
            }
        }
    }
}

/// Emit an event to an optional progress callback.
pub(crate) fn emit<F>(progress_cb: &Option<F>, event: BuildEvent)
where
    F: Fn(BuildEvent),
{
    if let Some(cb) = progress_cb {
        cb(event);
    }
}
