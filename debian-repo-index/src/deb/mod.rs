// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfaces for .deb package files.

The repository builder never looks inside a `.deb` itself. It goes through a
[PackageInspector], which yields the package's control text and the list of
paths it installs. [reader::DebFileInspector] is the implementation backed by
native `ar` and `tar` readers.
*/

use {
    crate::{
        binary_package_control::{Architecture, BinaryPackageControlFile},
        error::{RepositoryError, Result},
    },
    std::{io::Read, path::Path},
};

pub mod builder;
pub mod reader;

/// Compression format to apply to `.deb` files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// Do not compress contents of `.deb` files.
    Uncompressed,
    /// Compress as `.gz` files.
    Gzip,
    /// Compress as `.xz` files using a specified compression level.
    Xz(u32),
    /// Compress as `.zst` files using a specified compression level.
    Zstandard(i32),
}

impl DebCompression {
    /// Obtain the filename extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Uncompressed => "",
            Self::Gzip => ".gz",
            Self::Xz(_) => ".xz",
            Self::Zstandard(_) => ".zst",
        }
    }

    /// Resolve the format from an archive member filename extension.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "" => Ok(Self::Uncompressed),
            ".gz" => Ok(Self::Gzip),
            ".xz" => Ok(Self::Xz(6)),
            ".zst" => Ok(Self::Zstandard(3)),
            _ => Err(RepositoryError::DebUnknownCompression(extension.to_string())),
        }
    }

    /// Compress input data from a reader.
    pub fn compress(&self, reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        match self {
            Self::Uncompressed => {
                std::io::copy(reader, &mut buffer)?;
            }
            Self::Gzip => {
                let header = libflate::gzip::HeaderBuilder::new().finish();

                let mut encoder = libflate::gzip::Encoder::with_options(
                    &mut buffer,
                    libflate::gzip::EncodeOptions::new().header(header),
                )?;
                std::io::copy(reader, &mut encoder)?;
                encoder.finish().into_result()?;
            }
            Self::Xz(level) => {
                let mut encoder = xz2::write::XzEncoder::new(buffer, *level);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Zstandard(level) => {
                let mut encoder = zstd::Encoder::new(buffer, *level)?;
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
        }

        Ok(buffer)
    }

    /// Wrap a reader of data in this format with a decompressing reader.
    pub fn decompress_reader<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Uncompressed => Box::new(reader),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(reader)?),
            Self::Xz(_) => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Zstandard(_) => Box::new(zstd::Decoder::new(reader)?),
        })
    }
}

/// Name and architecture of a package, as declared by its control file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageClassification {
    /// The `Package` field.
    pub name: String,
    /// The `Architecture` field.
    pub architecture: Architecture,
}

/// Extracts metadata from package files.
pub trait PackageInspector {
    /// Obtain the raw text of the package's `control` file.
    fn read_control_metadata(&self, path: &Path) -> Result<String>;

    /// Obtain the paths installed by the package, in archive order.
    ///
    /// Directory entries end with `/`.
    fn read_file_list(&self, path: &Path) -> Result<Vec<String>>;

    /// Resolve the name and supported architecture of a package.
    ///
    /// Errors are wrapped in [RepositoryError::PackageRead] naming the package file.
    fn classify(&self, path: &Path) -> Result<PackageClassification> {
        let filename = path
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let wrap = |e: RepositoryError| RepositoryError::PackageRead(filename.clone(), Box::new(e));

        let text = self.read_control_metadata(path).map_err(wrap)?;
        let control = BinaryPackageControlFile::parse_str(&text).map_err(wrap)?;

        let name = control.package().map_err(wrap)?.to_string();
        let architecture = control.supported_architecture(&filename).map_err(wrap)?;

        Ok(PackageClassification { name, architecture })
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc, std::collections::HashMap};

    #[derive(Default)]
    struct StaticInspector {
        controls: HashMap<String, String>,
    }

    impl PackageInspector for StaticInspector {
        fn read_control_metadata(&self, path: &Path) -> Result<String> {
            self.controls
                .get(&path.display().to_string())
                .cloned()
                .ok_or(RepositoryError::ControlFileNotFound)
        }

        fn read_file_list(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[test]
    fn classify_packages() -> Result<()> {
        let mut inspector = StaticInspector::default();
        inspector.controls.insert(
            "foo.deb".into(),
            indoc! {"
                Package: foo
                Version: 1.0
                Architecture: all
            "}
            .into(),
        );
        inspector.controls.insert(
            "bad.deb".into(),
            "Package: bad\nArchitecture: x86_64\n".into(),
        );
        inspector
            .controls
            .insert("noarch.deb".into(), "Package: noarch\n".into());

        assert_eq!(
            inspector.classify(Path::new("foo.deb"))?,
            PackageClassification {
                name: "foo".into(),
                architecture: Architecture::All
            }
        );

        match inspector.classify(Path::new("bad.deb")) {
            Err(RepositoryError::PackageRead(filename, inner)) => {
                assert_eq!(filename, "bad.deb");
                assert!(matches!(
                    *inner,
                    RepositoryError::UnsupportedArchitecture(arch, _) if arch == "x86_64"
                ));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        assert!(matches!(
            inspector.classify(Path::new("noarch.deb")),
            Err(RepositoryError::PackageRead(_, inner))
                if matches!(*inner, RepositoryError::ControlRequiredFieldMissing(_))
        ));
        assert!(matches!(
            inspector.classify(Path::new("missing.deb")),
            Err(RepositoryError::PackageRead(_, _))
        ));

        Ok(())
    }

    #[test]
    fn compression_extensions() -> Result<()> {
        for compression in [
            DebCompression::Uncompressed,
            DebCompression::Gzip,
            DebCompression::Xz(6),
            DebCompression::Zstandard(3),
        ] {
            let encoded = compression.compress(&mut std::io::Cursor::new(b"payload"))?;

            let mut decoded = vec![];
            DebCompression::from_extension(compression.extension())?
                .decompress_reader(std::io::Cursor::new(encoded))?
                .read_to_end(&mut decoded)?;
            assert_eq!(decoded, b"payload");
        }

        assert!(matches!(
            DebCompression::from_extension(".bz2"),
            Err(RepositoryError::DebUnknownCompression(_))
        ));

        Ok(())
    }
}
