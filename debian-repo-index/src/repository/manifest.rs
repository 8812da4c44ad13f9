// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file generation. */

use {
    crate::{
        control::{ControlField, ControlParagraph},
        error::Result,
        io::{digest_path, MultiContentDigest},
        repository::{
            filesystem::{
                list_subdirectories, relative_path_string, remove_file_if_exists,
                sorted_glob_directories, sorted_glob_files, write_file_synced,
            },
            packages::{compressed_path, INDEX_COMPRESSION},
            release::{ChecksumType, ReleaseFile, DATE_FORMAT},
        },
    },
    chrono::{DateTime, Utc},
    log::debug,
    std::path::{Path, PathBuf},
};

/// An index file listed in a `Release` file.
#[derive(Clone, Debug)]
pub struct IndexFile {
    /// Path relative to the distribution root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Digests of the file content.
    pub digests: MultiContentDigest,
}

/// Metadata of a `Release` file to generate.
#[derive(Clone, Debug)]
pub struct ReleaseManifest {
    /// Value of the `Codename` field.
    pub codename: String,
    /// Value of the `Suite` field.
    pub suite: String,
    /// Value of the `Version` field.
    pub version: String,
    /// Value of the `Description` field.
    pub description: String,
    /// Architecture names for the `Architectures` field.
    pub architectures: Vec<String>,
    /// Time the release was generated.
    pub date: DateTime<Utc>,
    /// Checksum flavors to list index files under, in order.
    pub checksums: Vec<ChecksumType>,
}

impl ReleaseManifest {
    /// Resolve the components in a distribution directory.
    ///
    /// Every subdirectory is a component, whether or not the current build touched it.
    pub fn components(distribution_root: &Path) -> Result<Vec<String>> {
        list_subdirectories(distribution_root)
    }

    /// Resolve the index files of a component, relative to the distribution root.
    ///
    /// For every `binary-<arch>` directory, its `Packages` files are listed. Then every
    /// `Contents-<arch>` file and its compressed variant follow. Files are not required
    /// to exist.
    pub fn component_index_paths(distribution_root: &Path, component: &str) -> Result<Vec<PathBuf>> {
        let component_dir = distribution_root.join(component);

        let mut paths = vec![];

        for binary_dir in sorted_glob_directories(&component_dir, "binary-*")? {
            let packages = binary_dir.join("Packages");
            let compressed = compressed_path(&packages, INDEX_COMPRESSION);
            paths.extend([packages, compressed]);
        }

        for contents in sorted_glob_files(&component_dir, "Contents-*")? {
            // Compressed variants are listed next to their plain file.
            if contents.extension().is_none() {
                let compressed = compressed_path(&contents, INDEX_COMPRESSION);
                paths.extend([contents, compressed]);
            }
        }

        Ok(paths)
    }

    /// Digest every index file of the given components.
    pub fn collect_index_files(
        &self,
        distribution_root: &Path,
        components: &[String],
    ) -> Result<Vec<IndexFile>> {
        let mut res = vec![];

        for component in components {
            for path in Self::component_index_paths(distribution_root, component)? {
                let (size, digests) = digest_path(&path, self.checksums.iter().copied())?;
                let path = relative_path_string(distribution_root, &path);
                debug!("{}: {} bytes", path, size);

                res.push(IndexFile {
                    path,
                    size,
                    digests,
                });
            }
        }

        Ok(res)
    }

    /// Create the `Release` paragraph.
    pub fn create_release_file(
        &self,
        components: &[String],
        indices: &[IndexFile],
    ) -> ReleaseFile<'static> {
        let mut para = ControlParagraph::default();

        para.set_field_from_string("Codename".into(), self.codename.clone().into());
        para.set_field_from_string("Version".into(), self.version.clone().into());
        para.set_field_from_string(
            "Architectures".into(),
            self.architectures.join(" ").into(),
        );
        para.set_field_from_string("Description".into(), self.description.clone().into());
        para.set_field_from_string("Suite".into(), self.suite.clone().into());
        para.set_field_from_string(
            "Date".into(),
            self.date.format(DATE_FORMAT).to_string().into(),
        );
        para.set_field_from_string("Components".into(), components.join(" ").into());

        for checksum in &self.checksums {
            para.set_field(ControlField::from_rows(
                checksum.field_name().into(),
                indices.iter().filter_map(|entry| {
                    entry
                        .digests
                        .digest_from_checksum(*checksum)
                        .map(|digest| {
                            format!("{} {} {}", digest.digest_hex(), entry.size, entry.path)
                        })
                }),
            ));
        }

        para.into()
    }

    /// Write the `Release` file of a distribution.
    ///
    /// A stale `InRelease` is removed first. Returns the path of the written file.
    pub fn write(&self, distribution_root: &Path) -> Result<PathBuf> {
        let components = Self::components(distribution_root)?;
        let indices = self.collect_index_files(distribution_root, &components)?;

        let release = self.create_release_file(&components, &indices);

        remove_file_if_exists(distribution_root.join("InRelease"))?;

        let path = distribution_root.join("Release");
        write_file_synced(&path, release.to_string().as_bytes())?;

        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::repository::filesystem::ensure_directory};

    fn manifest() -> ReleaseManifest {
        ReleaseManifest {
            codename: "termux".into(),
            suite: "termux".into(),
            version: "1".into(),
            description: "termux repository".into(),
            architectures: vec!["all".into(), "arm".into()],
            date: DateTime::parse_from_rfc3339("2023-10-07T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            checksums: ChecksumType::all().collect(),
        }
    }

    fn populate(dist: &Path, component: &str, arch: &str) -> Result<()> {
        let binary = dist.join(component).join(format!("binary-{}", arch));
        ensure_directory(&binary)?;

        for name in ["Packages", "Packages.xz"] {
            std::fs::write(binary.join(name), name)?;
        }
        for name in ["", ".xz"] {
            std::fs::write(
                dist.join(component).join(format!("Contents-{}{}", arch, name)),
                arch,
            )?;
        }

        Ok(())
    }

    #[test]
    fn write_release() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dist = td.path().join("dists").join("termux");
        populate(&dist, "extras", "all")?;
        populate(&dist, "bar", "arm")?;
        std::fs::write(dist.join("InRelease"), b"stale")?;

        let path = manifest().write(&dist)?;
        assert!(!dist.join("InRelease").exists());

        let text = std::fs::read_to_string(&path)?;
        assert!(text.starts_with(
            "Codename: termux\nVersion: 1\nArchitectures: all arm\nDescription: termux repository\nSuite: termux\nDate: Sat, 07 Oct 2023 12:00:00 +0000\nComponents: bar extras\nMD5Sum:\n "
        ));

        let release = ReleaseFile::from_reader(std::io::Cursor::new(text.as_bytes()))?;
        assert_eq!(
            release.components().unwrap().collect::<Vec<_>>(),
            vec!["bar", "extras"]
        );

        for checksum in ChecksumType::all() {
            let entries = release
                .iter_index_files(checksum)
                .unwrap()
                .collect::<Result<Vec<_>>>()?;

            // 4 artifacts per component, one row each.
            assert_eq!(
                entries.iter().map(|e| e.path).collect::<Vec<_>>(),
                vec![
                    "bar/binary-arm/Packages",
                    "bar/binary-arm/Packages.xz",
                    "bar/Contents-arm",
                    "bar/Contents-arm.xz",
                    "extras/binary-all/Packages",
                    "extras/binary-all/Packages.xz",
                    "extras/Contents-all",
                    "extras/Contents-all.xz",
                ]
            );

            for entry in entries {
                let (size, digest) = checksum.digest_path(dist.join(entry.path))?;
                assert_eq!(entry.size, size);
                assert_eq!(entry.digest, digest);
            }
        }

        Ok(())
    }

    #[test]
    fn missing_index_file_is_fatal() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dist = td.path().join("dists").join("termux");
        populate(&dist, "main", "all")?;
        std::fs::remove_file(dist.join("main/binary-all/Packages.xz"))?;

        assert!(manifest().write(&dist).is_err());
        assert!(!dist.join("Release").exists());

        Ok(())
    }
}
