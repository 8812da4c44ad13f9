// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),

    #[error("glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("glob error: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("'{0}' does not exist")]
    InputPathMissing(String),

    #[error("No .deb file found in '{0}'")]
    NoPackagesFound(String),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("Control file lacks a paragraph")]
    ControlFileNoParagraph,

    #[error("Control file not found")]
    ControlFileNotFound,

    #[error("required field missing in control file: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("Unsupported arch '{0}' in '{1}'")]
    UnsupportedArchitecture(String, String),

    #[error("error reading package '{0}': {1}")]
    PackageRead(String, Box<RepositoryError>),

    #[error("unknown entry in binary package archive: {0}")]
    DebUnknownBinaryPackageEntry(String),

    #[error("unknown compression in deb archive file: {0}")]
    DebUnknownCompression(String),

    #[error("expected 1 paragraph in control file; got {0}")]
    ReleaseControlParagraphMismatch(usize),

    #[error("digest missing from index entry")]
    ReleaseMissingDigest,

    #[error("size missing from index entry")]
    ReleaseMissingSize,

    #[error("path missing from index entry")]
    ReleaseMissingPath,

    #[error("index entry path unexpectedly has spaces: {0}")]
    ReleasePathWithSpaces(String),

    #[error("unable to locate signing program: {0}")]
    SignerNotFound(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

impl RepositoryError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io_path(path: impl AsRef<std::path::Path>, e: std::io::Error) -> Self {
        Self::RepositoryIoPath(format!("{}", path.as_ref().display()), e)
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;
