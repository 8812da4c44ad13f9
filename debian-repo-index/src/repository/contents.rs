// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Contents` index file handling. */

use {
    crate::{error::Result, repository::filesystem::append_to_file},
    std::{
        collections::{BTreeMap, BTreeSet},
        io::BufRead,
        path::Path,
    },
};

/// Width of the path column in `Contents` rows.
pub const CONTENTS_PATH_WIDTH: usize = 80;

/// Format a single `Contents` row mapping `path` to `package`.
pub fn format_contents_row(path: &str, package: &str) -> String {
    format!(
        "{:<width$} {}\n",
        path,
        package,
        width = CONTENTS_PATH_WIDTH
    )
}

/// Normalize a path from a package's file list into its `Contents` form.
///
/// Returns [None] for directory entries, which are not indexed.
pub fn contents_path(entry: &str) -> Option<&str> {
    if entry.ends_with('/') {
        return None;
    }

    let path = entry.trim_start_matches("./").trim_start_matches('/');

    if path.is_empty() || path == "." {
        None
    } else {
        Some(path)
    }
}

/// Append rows for every installed file of `package` to the `Contents` file at `path`.
///
/// Returns the number of rows appended.
pub fn append_package_contents<'a>(
    path: impl AsRef<Path>,
    package: &str,
    files: impl IntoIterator<Item = &'a str>,
) -> Result<usize> {
    let mut rows = String::new();
    let mut count = 0;

    for file in files.into_iter().filter_map(contents_path) {
        rows.push_str(&format_contents_row(file, package));
        count += 1;
    }

    append_to_file(path, rows.as_bytes())?;

    Ok(count)
}

/// Represents a `Contents` file.
///
/// A `Contents` file maps paths to packages. It facilitates lookups of which paths
/// are in which packages.
#[derive(Clone, Debug, Default)]
pub struct ContentsFile {
    /// Mapping of paths to packages they occur in.
    paths: BTreeMap<String, BTreeSet<String>>,
    /// Mapping of package names to paths they contain.
    packages: BTreeMap<String, BTreeSet<String>>,
    /// Number of rows parsed.
    rows: usize,
}

impl ContentsFile {
    fn parse_and_add_line(&mut self, line: &str) {
        // Rows are `<path><padding> <packages>`. The path can contain spaces, so split
        // on the last whitespace run. Lines not of this form are ignored.
        let line = line.trim_end();

        let (path, packages) = match line.rsplit_once(|c: char| c.is_ascii_whitespace()) {
            Some((path, packages)) => (path.trim_end(), packages),
            None => return,
        };

        if path.is_empty() || packages.is_empty() {
            return;
        }

        self.rows += 1;

        for package in packages.split(',') {
            self.add_package_path(path.to_string(), package.to_string());
        }
    }

    /// Register a path as belonging to a package.
    pub fn add_package_path(&mut self, path: String, package: String) {
        self.paths
            .entry(path.clone())
            .or_default()
            .insert(package.clone());
        self.packages.entry(package).or_default().insert(path);
    }

    /// Number of rows that were parsed into this instance.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Obtain an iterator of packages having the specified path.
    pub fn packages_with_path(&self, path: &str) -> Box<dyn Iterator<Item = &str> + '_> {
        if let Some(packages) = self.paths.get(path) {
            Box::new(packages.iter().map(|x| x.as_str()))
        } else {
            Box::new(std::iter::empty())
        }
    }

    /// Obtain an iterator of paths in a given package.
    pub fn package_paths(&self, package: &str) -> Box<dyn Iterator<Item = &str> + '_> {
        if let Some(paths) = self.packages.get(package) {
            Box::new(paths.iter().map(|x| x.as_str()))
        } else {
            Box::new(std::iter::empty())
        }
    }
}

/// Parses `Contents` files from a reader.
#[derive(Clone, Debug)]
pub struct ContentsFileReader<R> {
    reader: R,
    contents: ContentsFile,
}

impl<R: BufRead> ContentsFileReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            contents: ContentsFile::default(),
        }
    }

    /// Parse the entirety of the source reader.
    pub fn read_all(&mut self) -> Result<usize> {
        let mut bytes_read = 0;

        loop {
            let read_size = self.read_line()?;
            if read_size == 0 {
                break;
            }

            bytes_read += read_size;
        }

        Ok(bytes_read)
    }

    /// Read and parse a single line from the reader.
    pub fn read_line(&mut self) -> Result<usize> {
        let mut line = String::new();
        let read_size = self.reader.read_line(&mut line)?;

        if read_size != 0 {
            self.contents.parse_and_add_line(&line);
        }

        Ok(read_size)
    }

    /// Consume the instance and return the inner [ContentsFile] and the reader.
    pub fn consume(self) -> (ContentsFile, R) {
        (self.contents, self.reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn row_format() {
        let row = format_contents_row("usr/bin/foo", "foo");
        assert_eq!(row.len(), 80 + 1 + 3 + 1);
        assert!(row.starts_with("usr/bin/foo "));
        assert!(row.ends_with(" foo\n"));

        // Long paths are not truncated.
        let long = "a".repeat(100);
        assert_eq!(format_contents_row(&long, "p"), format!("{} p\n", long));
    }

    #[test]
    fn path_normalization() {
        assert_eq!(contents_path("./usr/bin/foo"), Some("usr/bin/foo"));
        assert_eq!(contents_path("usr/share/doc"), Some("usr/share/doc"));
        assert_eq!(contents_path("./usr/"), None);
        assert_eq!(contents_path("./"), None);
        assert_eq!(contents_path("."), None);
    }

    #[test]
    fn append_and_parse() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("Contents-all");

        assert_eq!(
            append_package_contents(&path, "foo", ["./", "./usr/", "./usr/bin/foo"])?,
            1
        );
        assert_eq!(
            append_package_contents(
                &path,
                "bar",
                ["./usr/bin/foo", "./usr/share/my file.txt"]
            )?,
            2
        );

        let mut reader =
            ContentsFileReader::new(std::io::BufReader::new(std::fs::File::open(&path)?));
        reader.read_all()?;
        let (contents, _) = reader.consume();

        assert_eq!(contents.row_count(), 3);
        assert_eq!(
            contents.packages_with_path("usr/bin/foo").collect::<Vec<_>>(),
            vec!["bar", "foo"]
        );
        assert_eq!(
            contents.package_paths("bar").collect::<Vec<_>>(),
            vec!["usr/bin/foo", "usr/share/my file.txt"]
        );

        Ok(())
    }
}
