// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index generation.

A `Packages` file holds one control paragraph per package in a
`binary-<arch>` directory. Each paragraph is the package's own control file
followed by the fields locating and verifying the package file: `Filename`,
`Size` and one digest field per checksum.
*/

use {
    crate::{
        control::{parse_first_paragraph, ControlParagraph},
        deb::PackageInspector,
        error::{RepositoryError, Result},
        io::{digest_path, Compression},
        repository::{
            emit,
            filesystem::{
                relative_path_string, sorted_glob_directories, sorted_glob_files,
                write_file_synced,
            },
            release::ChecksumType,
            BuildEvent,
        },
    },
    log::debug,
    std::path::{Path, PathBuf},
};

/// Compression formats `Packages` and `Contents` files are published in, besides plain.
pub const INDEX_COMPRESSION: Compression = Compression::Xz;

/// Fields derived from the package file, replaced if the control file carries them.
fn derived_field_names() -> impl Iterator<Item = &'static str> {
    ["Filename", "Size"]
        .into_iter()
        .chain(ChecksumType::all().map(|c| c.field_name()))
}

/// Derive the `Packages` paragraph for a package file.
///
/// `filename` is the value of the `Filename` field, relative to the repository root.
pub fn package_paragraph(
    inspector: &(impl PackageInspector + ?Sized),
    package_path: &Path,
    filename: &str,
    checksums: &[ChecksumType],
) -> Result<ControlParagraph<'static>> {
    let package_name = package_path
        .file_name()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default();

    let text = inspector
        .read_control_metadata(package_path)
        .map_err(|e| RepositoryError::PackageRead(package_name.clone(), Box::new(e)))?;
    let mut para = parse_first_paragraph(&text)
        .map_err(|e| RepositoryError::PackageRead(package_name, Box::new(e)))?;

    for name in derived_field_names() {
        para.remove_field(name);
    }

    let (size, digests) = digest_path(package_path, checksums.iter().copied())?;

    para.set_field_from_string("Filename".into(), filename.to_string().into());
    para.set_field_from_string("Size".into(), size.to_string().into());

    for digest in digests.iter_digests() {
        para.set_field_from_string(digest.field_name().into(), digest.digest_hex().into());
    }

    Ok(para)
}

/// Write `Packages` and its compressed variant for a `binary-<arch>` directory.
///
/// `Filename` values are relative to `repository_root`. Returns the number of
/// packages indexed.
pub fn write_packages_index<F>(
    inspector: &(impl PackageInspector + ?Sized),
    repository_root: &Path,
    binary_dir: &Path,
    checksums: &[ChecksumType],
    progress_cb: &Option<F>,
) -> Result<usize>
where
    F: Fn(BuildEvent),
{
    let packages = sorted_glob_files(binary_dir, "*.deb")?;

    let mut content = String::new();

    for package_path in &packages {
        let filename = relative_path_string(repository_root, package_path);
        debug!("indexing {}", filename);

        let para = package_paragraph(inspector, package_path, &filename, checksums)?;

        content.push_str(&para.to_string());
        content.push('\n');
    }

    let packages_path = binary_dir.join("Packages");
    let size = write_file_synced(&packages_path, content.as_bytes())?;
    emit(
        progress_cb,
        BuildEvent::IndexFileWritten(relative_path_string(repository_root, &packages_path), size),
    );

    let compressed = compressed_path(&packages_path, INDEX_COMPRESSION);
    INDEX_COMPRESSION.compress_path(&packages_path, &compressed)?;
    emit(
        progress_cb,
        BuildEvent::IndexFileWritten(
            relative_path_string(repository_root, &compressed),
            file_size(&compressed)?,
        ),
    );

    Ok(packages.len())
}

/// Write all index files of a component.
///
/// Every `binary-<arch>` directory gets its `Packages` files and every
/// `Contents-<arch>` file gets a compressed variant.
pub fn write_component_indices<F>(
    inspector: &(impl PackageInspector + ?Sized),
    repository_root: &Path,
    component_dir: &Path,
    checksums: &[ChecksumType],
    progress_cb: &Option<F>,
) -> Result<()>
where
    F: Fn(BuildEvent),
{
    for binary_dir in sorted_glob_directories(component_dir, "binary-*")? {
        write_packages_index(
            inspector,
            repository_root,
            &binary_dir,
            checksums,
            progress_cb,
        )?;
    }

    for contents in sorted_glob_files(component_dir, "Contents-*")? {
        if contents.extension().is_some() {
            continue;
        }

        let compressed = compressed_path(&contents, INDEX_COMPRESSION);
        INDEX_COMPRESSION.compress_path(&contents, &compressed)?;
        emit(
            progress_cb,
            BuildEvent::IndexFileWritten(
                relative_path_string(repository_root, &compressed),
                file_size(&compressed)?,
            ),
        );
    }

    Ok(())
}

/// The path of the compressed variant of a file.
pub fn compressed_path(path: &Path, compression: Compression) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(compression.extension());

    PathBuf::from(s)
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .map_err(|e| RepositoryError::io_path(path, e))?
        .len())
}
