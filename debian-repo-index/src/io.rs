// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers.

This module holds the content digesting and compression primitives every stage of
repository building relies on.
*/

use {
    crate::{
        error::{RepositoryError, Result},
        repository::release::ChecksumType,
    },
    digest::DynDigest,
    std::{
        fmt::Formatter,
        io::{BufReader, Read, Write},
        path::Path,
    },
};

/// Represents a content digest.
#[derive(Clone, Eq, PartialEq, PartialOrd)]
pub enum ContentDigest {
    /// An MD5 digest.
    Md5(Vec<u8>),
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
    /// A SHA-512 digest.
    Sha512(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(data) => write!(f, "Md5({})", hex::encode(data)),
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
            Self::Sha512(data) => write!(f, "Sha512({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Construct an instance from raw digest bytes of a given [ChecksumType].
    pub fn from_bytes(checksum: ChecksumType, digest: Vec<u8>) -> Self {
        match checksum {
            ChecksumType::Md5 => Self::Md5(digest),
            ChecksumType::Sha1 => Self::Sha1(digest),
            ChecksumType::Sha256 => Self::Sha256(digest),
            ChecksumType::Sha512 => Self::Sha512(digest),
        }
    }

    /// Obtain an instance by parsing a hex string as a [ChecksumType].
    pub fn from_hex_digest(checksum: ChecksumType, digest: &str) -> Result<Self> {
        Ok(Self::from_bytes(checksum, hex::decode(digest)?))
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(x) => x,
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
            Self::Sha512(x) => x,
        }
    }

    /// Obtain the hex encoded content digest.
    ///
    /// Hex characters are lowercase.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }

    /// Obtain the [ChecksumType] for this digest.
    pub fn checksum_type(&self) -> ChecksumType {
        match self {
            Self::Md5(_) => ChecksumType::Md5,
            Self::Sha1(_) => ChecksumType::Sha1,
            Self::Sha256(_) => ChecksumType::Sha256,
            Self::Sha512(_) => ChecksumType::Sha512,
        }
    }

    /// Obtain the name of the field in `Release` and `Packages` files that holds this digest type.
    pub fn field_name(&self) -> &'static str {
        self.checksum_type().field_name()
    }
}

/// Holds multiple flavors of content digests.
///
/// Digests are stored in the order their [ChecksumType] were requested.
#[derive(Clone, Debug, Default)]
pub struct MultiContentDigest {
    digests: Vec<ContentDigest>,
}

impl MultiContentDigest {
    /// Whether this digest matches another one.
    pub fn matches_digest(&self, other: &ContentDigest) -> bool {
        self.digests.iter().any(|d| d == other)
    }

    /// Obtain the [ContentDigest] for a given [ChecksumType].
    pub fn digest_from_checksum(&self, checksum: ChecksumType) -> Option<&ContentDigest> {
        self.digests
            .iter()
            .find(|d| d.checksum_type() == checksum)
    }

    /// Obtain an iterator of [ContentDigest] in this instance.
    pub fn iter_digests(&self) -> impl Iterator<Item = &ContentDigest> + '_ {
        self.digests.iter()
    }
}

/// A content digester that simultaneously computes multiple digest types.
pub struct MultiDigester {
    hashers: Vec<(ChecksumType, Box<dyn DynDigest + Send>)>,
}

impl MultiDigester {
    /// Construct an instance computing the given checksum flavors.
    pub fn new(checksums: impl IntoIterator<Item = ChecksumType>) -> Self {
        Self {
            hashers: checksums
                .into_iter()
                .map(|checksum| (checksum, checksum.new_hasher()))
                .collect(),
        }
    }

    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in self.hashers.iter_mut() {
            hasher.update(data);
        }
    }

    /// Finish digesting content.
    ///
    /// Consumes the instance and returns a [MultiContentDigest] holding all the digests.
    pub fn finish(self) -> MultiContentDigest {
        MultiContentDigest {
            digests: self
                .hashers
                .into_iter()
                .map(|(checksum, hasher)| {
                    ContentDigest::from_bytes(checksum, hasher.finalize().to_vec())
                })
                .collect(),
        }
    }
}

impl Write for MultiDigester {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Compute the size and digests of a file in a single pass.
pub fn digest_path(
    path: impl AsRef<Path>,
    checksums: impl IntoIterator<Item = ChecksumType>,
) -> Result<(u64, MultiContentDigest)> {
    let path = path.as_ref();

    let fh = std::fs::File::open(path).map_err(|e| RepositoryError::io_path(path, e))?;
    let mut reader = BufReader::new(fh);
    let mut digester = MultiDigester::new(checksums);

    let size =
        std::io::copy(&mut reader, &mut digester).map_err(|e| RepositoryError::io_path(path, e))?;

    Ok((size, digester.finish()))
}

/// Compression format used by repository index files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// XZ compression (.xz extension).
    Xz,

    /// Gzip compression (.gz extension).
    Gzip,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
        }
    }

    /// Copy `reader` into `writer`, compressing along the way.
    fn compress_stream(&self, reader: &mut impl Read, writer: impl Write) -> std::io::Result<u64> {
        match self {
            Self::None => {
                let mut writer = writer;
                std::io::copy(reader, &mut writer)
            }
            Self::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(writer, 6);
                let size = std::io::copy(reader, &mut encoder)?;
                encoder.finish()?;
                Ok(size)
            }
            Self::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(writer)?;
                let size = std::io::copy(reader, &mut encoder)?;
                encoder.finish().into_result()?;
                Ok(size)
            }
        }
    }

    /// Compress the file at `source` into a new file at `dest`.
    ///
    /// Any existing file at `dest` is truncated. Returns the number of uncompressed bytes read.
    pub fn compress_path(&self, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
        let source = source.as_ref();
        let dest = dest.as_ref();

        let mut reader = BufReader::new(
            std::fs::File::open(source).map_err(|e| RepositoryError::io_path(source, e))?,
        );
        let fh = std::fs::File::create(dest).map_err(|e| RepositoryError::io_path(dest, e))?;

        let size = self
            .compress_stream(&mut reader, &fh)
            .map_err(|e| RepositoryError::io_path(dest, e))?;

        fh.sync_all().map_err(|e| RepositoryError::io_path(dest, e))?;

        Ok(size)
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Read};

    #[test]
    fn digest_known_values() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("data");
        std::fs::write(&path, b"hello world")?;

        let (size, digests) = digest_path(&path, ChecksumType::all())?;
        assert_eq!(size, 11);

        assert_eq!(
            digests
                .digest_from_checksum(ChecksumType::Md5)
                .unwrap()
                .digest_hex(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            digests
                .digest_from_checksum(ChecksumType::Sha1)
                .unwrap()
                .digest_hex(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            digests
                .digest_from_checksum(ChecksumType::Sha256)
                .unwrap()
                .digest_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            digests
                .digest_from_checksum(ChecksumType::Sha512)
                .unwrap()
                .digest_bytes()
                .len(),
            64
        );

        assert_eq!(
            digests.iter_digests().map(|d| d.field_name()).collect::<Vec<_>>(),
            vec!["MD5Sum", "SHA1", "SHA256", "SHA512"]
        );

        Ok(())
    }

    #[test]
    fn digest_subset_and_missing() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("empty");
        std::fs::write(&path, b"")?;

        let (size, digests) = digest_path(&path, [ChecksumType::Sha256])?;
        assert_eq!(size, 0);
        assert!(digests.digest_from_checksum(ChecksumType::Md5).is_none());
        assert!(digests.matches_digest(&ContentDigest::from_hex_digest(
            ChecksumType::Sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        )?));

        assert!(matches!(
            digest_path(td.path().join("missing"), [ChecksumType::Md5]),
            Err(RepositoryError::RepositoryIoPath(_, _))
        ));

        Ok(())
    }

    #[test]
    fn xz_compress_path() -> Result<()> {
        let td = tempfile::tempdir()?;
        let source = td.path().join("Packages");
        let dest = td.path().join("Packages.xz");
        std::fs::write(&source, b"Package: foo\n\n")?;

        assert_eq!(Compression::Xz.compress_path(&source, &dest)?, 14);

        let mut decoded = vec![];
        xz2::read::XzDecoder::new(std::fs::File::open(&dest)?).read_to_end(&mut decoded)?;
        assert_eq!(decoded, b"Package: foo\n\n");

        Ok(())
    }
}
