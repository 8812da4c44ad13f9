// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files. */

use {
    crate::{deb::DebCompression, error::Result},
    md5::Digest,
    std::{
        collections::{BTreeMap, BTreeSet},
        io::{Read, Write},
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

/// A file to install, as (content, executable).
type InstallFile = (Vec<u8>, bool);

/// A builder for a `.deb` package file.
///
/// Output is deterministic when [Self::set_mtime()] is used.
pub struct DebBuilder {
    control: String,

    compression: DebCompression,

    /// Files to install as part of the package.
    install_files: BTreeMap<PathBuf, InstallFile>,

    mtime: Option<SystemTime>,
}

impl DebBuilder {
    /// Construct a new instance using the text of a `control` file.
    pub fn new(control: impl ToString) -> Self {
        Self {
            control: control.to_string(),
            compression: DebCompression::Gzip,
            install_files: BTreeMap::new(),
            mtime: None,
        }
    }

    /// Set the compression format to use.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the modified time to use on archive members.
    ///
    /// If not called, the current time will be used.
    pub fn set_mtime(mut self, time: Option<SystemTime>) -> Self {
        self.mtime = time;
        self
    }

    fn mtime(&self) -> u64 {
        self.mtime
            .unwrap_or_else(SystemTime::now)
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// Register a file as to be installed by this package.
    ///
    /// Filenames should be relative to the filesystem root. e.g.
    /// `usr/bin/myapp`.
    pub fn install_file(
        mut self,
        path: impl AsRef<Path>,
        data: impl Into<Vec<u8>>,
        executable: bool,
    ) -> Self {
        self.install_files
            .insert(path.as_ref().to_path_buf(), (data.into(), executable));
        self
    }

    /// The content of the `md5sums` control member.
    fn md5sums(&self) -> Vec<u8> {
        let mut res = vec![];

        for (path, (data, _)) in &self.install_files {
            let digest = md5::Md5::digest(data);

            res.extend_from_slice(
                format!("{}  {}\n", hex::encode(digest), path.display()).as_bytes(),
            );
        }

        res
    }

    fn append_ar_member<W: Write>(
        &self,
        builder: &mut ar::Builder<W>,
        name: String,
        data: &[u8],
    ) -> Result<()> {
        let mut header = ar::Header::new(name.into_bytes(), data.len() as _);
        header.set_mode(0o644);
        header.set_mtime(self.mtime());
        header.set_uid(0);
        header.set_gid(0);
        builder.append(&header, data)?;

        Ok(())
    }

    /// Write `.deb` file content to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut ar_builder = ar::Builder::new(writer);

        // First entry is a debian-binary file with static content.
        self.append_ar_member(&mut ar_builder, "debian-binary".to_string(), b"2.0\n")?;

        let mut control_files = BTreeMap::new();
        control_files.insert(
            PathBuf::from("control"),
            (self.control.as_bytes().to_vec(), false),
        );
        control_files.insert(PathBuf::from("md5sums"), (self.md5sums(), false));

        let mut control_tar = vec![];
        write_deb_tar(&mut control_tar, &control_files, self.mtime())?;
        let control_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(control_tar))?;
        self.append_ar_member(
            &mut ar_builder,
            format!("control.tar{}", self.compression.extension()),
            &control_tar,
        )?;

        let mut data_tar = vec![];
        write_deb_tar(&mut data_tar, &self.install_files, self.mtime())?;
        let data_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(data_tar))?;
        self.append_ar_member(
            &mut ar_builder,
            format!("data.tar{}", self.compression.extension()),
            &data_tar,
        )?;

        Ok(())
    }
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &Path,
    is_directory: bool,
) -> Result<()> {
    // Archives in the wild have names beginning with `./` and directories ending
    // with `/`. `set_path()` normalizes the `./` away, so write the name field directly.
    let value = format!(
        "./{}{}",
        path.display(),
        if is_directory { "/" } else { "" }
    );
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Long names are carried by a preceding GNU long link entry.
        let mut long_header = tar::Header::new_gnu();
        let name = b"././@LongLink";
        long_header.as_old_mut().name[..name.len()].clone_from_slice(&name[..]);
        long_header.set_mode(0o644);
        long_header.set_uid(0);
        long_header.set_gid(0);
        long_header.set_mtime(0);
        long_header.set_size(value_bytes.len() as u64 + 1);
        long_header.set_entry_type(tar::EntryType::GNULongName);
        long_header.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_header, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write a tar archive suitable for inclusion in a `.deb` archive.
///
/// A root `./` entry and entries for every parent directory precede the files.
pub fn write_deb_tar<W: Write>(
    writer: W,
    files: &BTreeMap<PathBuf, InstallFile>,
    mtime: u64,
) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    let mut header = new_tar_header(mtime)?;
    header.set_path(Path::new("./"))?;
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    builder.append(&header, std::io::empty())?;

    let directories = files
        .keys()
        .flat_map(|path| path.ancestors().skip(1))
        .filter(|p| !p.as_os_str().is_empty())
        .collect::<BTreeSet<_>>();

    for directory in directories {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, directory, true)?;
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, std::io::empty())?;
    }

    for (rel_path, (data, executable)) in files {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, rel_path, false)?;
        header.set_mode(if *executable { 0o755 } else { 0o644 });
        header.set_size(data.len() as _);
        header.set_cksum();
        builder.append(&header, data.as_slice())?;
    }

    builder.finish()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_data_tar_with_directories() -> Result<()> {
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from("foo/bar.txt"), (vec![42], true));

        let mut buffer = vec![];
        write_deb_tar(&mut buffer, &files, 2)?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));

        let paths = archive
            .entries()?
            .map(|entry| Ok(String::from_utf8_lossy(&entry?.path_bytes()).to_string()))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(paths, vec!["./", "./foo/", "./foo/bar.txt"]);

        Ok(())
    }

    #[test]
    fn write_data_tar_long_path() -> Result<()> {
        let long_path = PathBuf::from(format!("f{}.txt", "u".repeat(200)));

        let mut files = BTreeMap::new();
        files.insert(long_path, (vec![42], false));

        let mut buffer = vec![];
        write_deb_tar(&mut buffer, &files, 2)?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));

        let entry = archive.entries()?.nth(1).unwrap()?;
        assert_eq!(
            entry.path()?,
            Path::new(&format!("./f{}.txt", "u".repeat(200)))
        );

        Ok(())
    }

    #[test]
    fn write_deb_members() -> Result<()> {
        let builder = DebBuilder::new("Package: mypackage\nArchitecture: arm\n")
            .set_compression(DebCompression::Zstandard(3))
            .install_file("usr/bin/myapp", vec![42], true);

        let mut buffer = vec![];
        builder.write(&mut buffer)?;

        let mut archive = ar::Archive::new(std::io::Cursor::new(buffer));
        {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"debian-binary");
        }
        {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"control.tar.zst");
        }
        {
            let entry = archive.next_entry().unwrap().unwrap();
            assert_eq!(entry.header().identifier(), b"data.tar.zst");
        }

        assert!(archive.next_entry().is_none());

        Ok(())
    }

    #[test]
    fn md5sums_are_hex() {
        let builder = DebBuilder::new("Package: a\n").install_file("usr/a", b"hello world".to_vec(), false);

        assert_eq!(
            String::from_utf8(builder.md5sums()).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3  usr/a\n"
        );
    }
}
