// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem primitives for writing repositories to local directories. */

use {
    crate::error::{RepositoryError, Result},
    std::{
        fs::OpenOptions,
        io::{BufReader, Write},
        path::{Component, Path, PathBuf},
    },
};

/// How package files are placed into the repository tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MaterializeMode {
    /// Byte-for-byte copy, synced to storage before returning.
    Copy,

    /// Hard link to the source file.
    ///
    /// Source and destination must live on the same filesystem.
    HardLink,
}

impl MaterializeMode {
    /// Resolve the mode from a boolean *use hard links* setting.
    pub fn from_hard_links(use_hard_links: bool) -> Self {
        if use_hard_links {
            Self::HardLink
        } else {
            Self::Copy
        }
    }
}

/// Create a directory and all its parents.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    std::fs::create_dir_all(path).map_err(|e| RepositoryError::io_path(path, e))
}

/// Recursively delete a directory if it exists.
///
/// Returns whether something was deleted.
pub fn remove_directory_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();

    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RepositoryError::io_path(path, e)),
    }
}

/// Delete a file if it exists.
///
/// Returns whether something was deleted.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();

    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RepositoryError::io_path(path, e)),
    }
}

/// Place the file at `source` at `dest`.
///
/// An existing file at `dest` is replaced. Returns the size of the materialized file.
pub fn materialize_file(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    mode: MaterializeMode,
) -> Result<u64> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    match mode {
        MaterializeMode::HardLink => {
            // Linking fails if the destination exists.
            remove_file_if_exists(dest)?;

            std::fs::hard_link(source, dest).map_err(|e| RepositoryError::io_path(dest, e))?;

            Ok(std::fs::metadata(dest)
                .map_err(|e| RepositoryError::io_path(dest, e))?
                .len())
        }
        MaterializeMode::Copy => {
            let mut reader = BufReader::new(
                std::fs::File::open(source).map_err(|e| RepositoryError::io_path(source, e))?,
            );
            let mut fh =
                std::fs::File::create(dest).map_err(|e| RepositoryError::io_path(dest, e))?;

            let size =
                std::io::copy(&mut reader, &mut fh).map_err(|e| RepositoryError::io_path(dest, e))?;

            // The index pass reads the file back right away.
            fh.sync_all().map_err(|e| RepositoryError::io_path(dest, e))?;

            Ok(size)
        }
    }
}

/// Append data to a file, creating it if needed.
///
/// The file is opened and closed within this call.
pub fn append_to_file(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let mut fh = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RepositoryError::io_path(path, e))?;

    fh.write_all(data)
        .map_err(|e| RepositoryError::io_path(path, e))
}

/// Write data to a file, replacing any existing content, and sync it to storage.
pub fn write_file_synced(path: impl AsRef<Path>, data: &[u8]) -> Result<u64> {
    let path = path.as_ref();

    let mut fh = std::fs::File::create(path).map_err(|e| RepositoryError::io_path(path, e))?;
    fh.write_all(data)
        .map_err(|e| RepositoryError::io_path(path, e))?;
    fh.sync_all().map_err(|e| RepositoryError::io_path(path, e))?;

    Ok(data.len() as u64)
}

/// Resolve paths in `directory` matching a glob `pattern`, in sorted order.
///
/// Special characters in `directory` are escaped so only `pattern` is interpreted.
pub fn sorted_glob(directory: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>> {
    let directory = directory.as_ref();

    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&directory.display().to_string()),
        pattern
    );

    let mut paths = glob::glob(&full)?.collect::<std::result::Result<Vec<_>, _>>()?;
    paths.sort();

    Ok(paths)
}

/// Resolve regular files in `directory` matching a glob `pattern`, in sorted order.
pub fn sorted_glob_files(directory: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>> {
    Ok(sorted_glob(directory, pattern)?
        .into_iter()
        .filter(|p| p.is_file())
        .collect())
}

/// Resolve directories in `directory` matching a glob `pattern`, in sorted order.
pub fn sorted_glob_directories(
    directory: impl AsRef<Path>,
    pattern: &str,
) -> Result<Vec<PathBuf>> {
    Ok(sorted_glob(directory, pattern)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

/// Names of the immediate subdirectories of `directory`, sorted.
///
/// A missing directory has no subdirectories.
pub fn list_subdirectories(directory: impl AsRef<Path>) -> Result<Vec<String>> {
    let directory = directory.as_ref();

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(RepositoryError::io_path(directory, e)),
    };

    let mut names = vec![];

    for entry in entries {
        let entry = entry.map_err(|e| RepositoryError::io_path(directory, e))?;

        if entry
            .file_type()
            .map_err(|e| RepositoryError::io_path(entry.path(), e))?
            .is_dir()
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    names.sort();

    Ok(names)
}

/// Drop `.` components from a path.
///
/// `./in` and `in` refer to the same directory but do not compare equal as paths.
pub fn strip_current_dir(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref()
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Express `path` relative to `root` with `/` separators.
pub fn relative_path_string(root: impl AsRef<Path>, path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let relative = path.strip_prefix(root.as_ref()).unwrap_or(path);

    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
