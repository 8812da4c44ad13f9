// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! .deb file reading functionality. */

use {
    crate::{
        deb::{DebCompression, PackageInspector},
        error::{RepositoryError, Result},
    },
    std::{
        io::{BufReader, Cursor, Read},
        path::Path,
    },
};

fn tar_reader<'a>(extension: &str, data: impl Read + 'a) -> Result<tar::Archive<Box<dyn Read + 'a>>> {
    let reader = DebCompression::from_extension(extension)?.decompress_reader(data)?;

    Ok(tar::Archive::new(reader))
}

/// A reader of .deb files.
///
/// A .deb binary package file is an ar archive with 3 entries:
///
/// 1. `debian-binary` holding the version of the binary package format.
/// 2. `control.tar` holding package metadata.
/// 3. `data.tar[.<ext>]` holding file content.
pub struct BinaryPackageReader<R: Read> {
    archive: ar::Archive<R>,
}

impl<R: Read> BinaryPackageReader<R> {
    /// Construct a new instance from a reader.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
        }
    }

    /// Obtain the next entry from the underlying ar archive.
    ///
    /// The entry will be converted to an enum that richly represents its content.
    ///
    /// Tar members are decoded as they are read from the underlying reader. Whatever
    /// of a member is left unread is skipped when the next entry is requested.
    pub fn next_entry(&mut self) -> Option<Result<BinaryPackageEntry<'_>>> {
        let mut entry = match self.archive.next_entry()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };

        // Member names are ASCII in practice.
        let filename = String::from_utf8_lossy(entry.header().identifier()).to_string();

        Some(if filename == "debian-binary" {
            let mut data = vec![];
            entry
                .read_to_end(&mut data)
                .map(|_| BinaryPackageEntry::DebianBinary(Cursor::new(data)))
                .map_err(RepositoryError::from)
        } else if let Some(tail) = filename.strip_prefix("control.tar") {
            tar_reader(tail, entry).map(BinaryPackageEntry::Control)
        } else if let Some(tail) = filename.strip_prefix("data.tar") {
            tar_reader(tail, entry).map(BinaryPackageEntry::Data)
        } else {
            Err(RepositoryError::DebUnknownBinaryPackageEntry(filename))
        })
    }
}

/// Represents an entry in a .deb archive.
///
/// Tar archives borrow the [BinaryPackageReader] they came from.
pub enum BinaryPackageEntry<'a> {
    /// The `debian-binary` file.
    DebianBinary(Cursor<Vec<u8>>),
    /// The `control.tar` tar archive.
    Control(tar::Archive<Box<dyn Read + 'a>>),
    /// The `data.tar[.<ext>]` tar archive.
    Data(tar::Archive<Box<dyn Read + 'a>>),
}

/// Resolve the raw text of the `control` file from the `control.tar` file within a `.deb` archive.
pub fn resolve_control_text(reader: impl Read) -> Result<String> {
    let mut reader = BinaryPackageReader::new(reader);

    while let Some(entry) = reader.next_entry() {
        if let BinaryPackageEntry::Control(mut archive) = entry? {
            for entry in archive.entries()? {
                let mut entry = entry?;

                let path = String::from_utf8_lossy(&entry.path_bytes()).to_string();

                if path.trim_start_matches("./") == "control" {
                    let mut text = String::new();
                    entry.read_to_string(&mut text)?;

                    return Ok(text);
                }
            }
        }
    }

    Err(RepositoryError::ControlFileNotFound)
}

/// Resolve the paths stored in the `data.tar` file within a `.deb` archive.
///
/// Paths are emitted as stored in the archive. Directories end with `/`.
pub fn resolve_data_paths(reader: impl Read) -> Result<Vec<String>> {
    let mut reader = BinaryPackageReader::new(reader);

    while let Some(entry) = reader.next_entry() {
        if let BinaryPackageEntry::Data(mut archive) = entry? {
            let mut paths = vec![];

            for entry in archive.entries()? {
                let entry = entry?;

                let mut path = String::from_utf8_lossy(&entry.path_bytes()).to_string();

                // GNU tar already writes directories with a trailing slash. Others may not.
                if entry.header().entry_type().is_dir() && !path.ends_with('/') {
                    path.push('/');
                }

                paths.push(path);
            }

            return Ok(paths);
        }
    }

    Err(RepositoryError::DebUnknownBinaryPackageEntry(
        "data.tar".to_string(),
    ))
}

/// A [PackageInspector] reading `.deb` files from the filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebFileInspector {}

impl DebFileInspector {
    fn open(&self, path: &Path) -> Result<BufReader<std::fs::File>> {
        Ok(BufReader::new(
            std::fs::File::open(path).map_err(|e| RepositoryError::io_path(path, e))?,
        ))
    }
}

impl PackageInspector for DebFileInspector {
    fn read_control_metadata(&self, path: &Path) -> Result<String> {
        resolve_control_text(self.open(path)?)
    }

    fn read_file_list(&self, path: &Path) -> Result<Vec<String>> {
        resolve_data_paths(self.open(path)?)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{binary_package_control::Architecture, deb::builder::DebBuilder},
        indoc::indoc,
    };

    fn write_deb(path: &Path, compression: DebCompression) -> Result<()> {
        let builder = DebBuilder::new(indoc! {"
            Package: hello
            Version: 2.10
            Architecture: aarch64
            Description: greeting
        "})
        .set_compression(compression)
        .set_mtime(Some(std::time::SystemTime::UNIX_EPOCH))
        .install_file("data/data/com.termux/files/usr/bin/hello", b"#!/bin/sh\n".to_vec(), true)
        .install_file("data/data/com.termux/files/usr/share/doc/hello/README", b"hi".to_vec(), false);

        let mut fh = std::fs::File::create(path)?;
        builder.write(&mut fh)?;

        Ok(())
    }

    #[test]
    fn inspect_deb_files() -> Result<()> {
        let td = tempfile::tempdir()?;

        for compression in [
            DebCompression::Uncompressed,
            DebCompression::Gzip,
            DebCompression::Xz(6),
            DebCompression::Zstandard(3),
        ] {
            let path = td
                .path()
                .join(format!("hello{}.deb", compression.extension()));
            write_deb(&path, compression)?;

            let inspector = DebFileInspector::default();

            let control = inspector.read_control_metadata(&path)?;
            assert!(control.starts_with("Package: hello\n"));

            let classification = inspector.classify(&path)?;
            assert_eq!(classification.name, "hello");
            assert_eq!(classification.architecture, Architecture::Aarch64);

            let files = inspector.read_file_list(&path)?;
            assert!(files.contains(&"./data/data/com.termux/files/usr/bin/hello".to_string()));
            assert!(files.contains(&"./data/".to_string()));
            assert_eq!(files.iter().filter(|p| !p.ends_with('/')).count(), 2);
        }

        Ok(())
    }

    #[test]
    fn entries_in_order() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("hello.deb");
        write_deb(&path, DebCompression::Xz(6))?;

        let mut reader = BinaryPackageReader::new(std::fs::File::open(&path)?);

        match reader.next_entry().unwrap()? {
            BinaryPackageEntry::DebianBinary(data) => assert_eq!(data.into_inner(), b"2.0\n"),
            _ => panic!("expected debian-binary"),
        }

        // Left unread; the reader skips past it.
        assert!(matches!(
            reader.next_entry().unwrap()?,
            BinaryPackageEntry::Control(_)
        ));

        match reader.next_entry().unwrap()? {
            BinaryPackageEntry::Data(mut archive) => {
                let mut entries = archive.entries()?;
                let root = entries.next().unwrap()?;
                assert_eq!(root.path_bytes().as_ref(), b"./");
            }
            _ => panic!("expected data.tar"),
        }

        assert!(reader.next_entry().is_none());

        Ok(())
    }

    #[test]
    fn missing_and_garbage_files() -> Result<()> {
        let td = tempfile::tempdir()?;
        let inspector = DebFileInspector::default();

        assert!(matches!(
            inspector.read_control_metadata(&td.path().join("missing.deb")),
            Err(RepositoryError::RepositoryIoPath(_, _))
        ));

        let garbage = td.path().join("garbage.deb");
        std::fs::write(&garbage, b"not an archive")?;
        assert!(inspector.read_control_metadata(&garbage).is_err());

        Ok(())
    }
}
