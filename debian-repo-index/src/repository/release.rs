// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file primitives.

`Release` files (or `InRelease` if it contains a PGP cleartext signature) are
the main definition of a Debian repository. They are a control paragraph that
defines repository-level metadata as well as a list of additional *indices* files
that further define the content of the repository.

[ReleaseFile] represents a parsed `Release` file. It exposes accessor functions
for obtaining well-known metadata fields and the index file entries.
*/

use {
    crate::{
        control::{ControlParagraph, ControlParagraphReader},
        error::{RepositoryError, Result},
        io::{digest_path, ContentDigest},
    },
    chrono::{DateTime, Utc},
    digest::DynDigest,
    serde::Deserialize,
    std::{
        io::BufRead,
        ops::{Deref, DerefMut},
        path::Path,
        str::FromStr,
    },
};

/// Formatter string for dates in release files.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Checksum type / digest mechanism used in a release file.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,

    /// SHA-512.
    Sha512,
}

impl ChecksumType {
    /// All variants, weakest first.
    ///
    /// This is also the order digests are emitted in `Packages` and `Release` files.
    pub fn all() -> impl Iterator<Item = ChecksumType> {
        [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512].into_iter()
    }

    /// Name of the control field in `Release` and `Packages` files holding this variant type.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Obtain a new hasher for this checksum flavor.
    pub fn new_hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// Compute the size and digest of a file using this checksum flavor.
    pub fn digest_path(&self, path: impl AsRef<Path>) -> Result<(u64, ContentDigest)> {
        let (size, digests) = digest_path(path, [*self])?;

        let digest = digests
            .iter_digests()
            .next()
            .cloned()
            .unwrap_or_else(|| ContentDigest::from_bytes(*self, vec![]));

        Ok((size, digest))
    }
}

/// An entry for a file in a parsed `Release` file.
///
/// Instances correspond to a line in a `MD5Sum`, `SHA1`, `SHA256`, or `SHA512` field.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct ReleaseFileEntry<'a> {
    /// The path to this file within the repository.
    pub path: &'a str,

    /// The content digest of this file.
    pub digest: ContentDigest,

    /// The size of the file in bytes.
    pub size: u64,
}

/// A Debian repository `Release` file.
///
/// Release files contain metadata and list the index files for a *repository*.
/// They are effectively the entrypoint for defining a Debian repository and its
/// content.
///
/// Instances are wrappers around a [ControlParagraph]. [Deref] and [DerefMut] are
/// implemented to allow obtaining the inner [ControlParagraph]. [From] and [Into]
/// are implemented to allow cheap type coercions.
pub struct ReleaseFile<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> From<ControlParagraph<'a>> for ReleaseFile<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<ReleaseFile<'a>> for ControlParagraph<'a> {
    fn from(release: ReleaseFile<'a>) -> Self {
        release.paragraph
    }
}

impl<'a> Deref for ReleaseFile<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for ReleaseFile<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl<'a> ReleaseFile<'a> {
    /// Construct an instance by reading data from a reader.
    ///
    /// The source must be a Debian control file with exactly 1 paragraph.
    ///
    /// The source must not be PGP armored. i.e. do not feed it raw `InRelease`
    /// files that begin with `-----BEGIN PGP SIGNED MESSAGE-----`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        // A Release control file should have a single paragraph.
        if paragraphs.len() != 1 {
            return Err(RepositoryError::ReleaseControlParagraphMismatch(
                paragraphs.len(),
            ));
        }

        Ok(Self {
            paragraph: paragraphs.remove(0),
        })
    }

    /// Description of this repository.
    pub fn description(&self) -> Option<&str> {
        self.field_str("Description")
    }

    /// Version of this repository.
    pub fn version(&self) -> Option<&str> {
        self.field_str("Version")
    }

    /// Suite of this repository.
    pub fn suite(&self) -> Option<&str> {
        self.field_str("Suite")
    }

    /// Codename of this repository.
    pub fn codename(&self) -> Option<&str> {
        self.field_str("Codename")
    }

    /// Names of components within this repository.
    pub fn components(&self) -> Option<Box<(dyn Iterator<Item = &str> + '_)>> {
        self.iter_field_words("Components")
    }

    /// Machine architectures this repository has packages for.
    pub fn architectures(&self) -> Option<Box<(dyn Iterator<Item = &str> + '_)>> {
        self.iter_field_words("Architectures")
    }

    /// Time the release file was created, as its raw string value.
    pub fn date_str(&self) -> Option<&str> {
        self.field_str("Date")
    }

    /// Time the release file was created, as a [DateTime].
    ///
    /// The timezone from the original file is always normalized to UTC.
    pub fn date(&self) -> Option<Result<DateTime<Utc>>> {
        self.date_str().map(|v| {
            DateTime::parse_from_str(v, DATE_FORMAT)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| RepositoryError::ControlParseError(format!("invalid date {}: {}", v, e)))
        })
    }

    /// Obtain indexed files in this repository.
    ///
    /// Files are grouped by their checksum variant.
    ///
    /// If the specified checksum variant is present, [Some] is returned.
    ///
    /// The returned iterator emits [ReleaseFileEntry] instances. Entries are lazily
    /// parsed as they are consumed from the iterator. Parse errors result in an [Err].
    pub fn iter_index_files(
        &self,
        checksum: ChecksumType,
    ) -> Option<Box<(dyn Iterator<Item = Result<ReleaseFileEntry<'_>>> + '_)>> {
        self.iter_field_lines(checksum.field_name()).map(|iter| {
            Box::new(iter.map(move |v| {
                // Values are of form: <digest> <size> <path>

                let mut parts = v.split_ascii_whitespace();

                let digest = parts.next().ok_or(RepositoryError::ReleaseMissingDigest)?;
                let size = parts.next().ok_or(RepositoryError::ReleaseMissingSize)?;
                let path = parts.next().ok_or(RepositoryError::ReleaseMissingPath)?;

                if parts.next().is_some() {
                    return Err(RepositoryError::ReleasePathWithSpaces(v.to_string()));
                }

                let digest = ContentDigest::from_hex_digest(checksum, digest)?;
                let size = u64::from_str(size)?;

                Ok(ReleaseFileEntry { path, digest, size })
            })) as Box<(dyn Iterator<Item = Result<ReleaseFileEntry<'_>>> + '_)>
        })
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const RELEASE: &str = indoc! {"
        Codename: termux
        Version: 1
        Architectures: aarch64 all
        Description: termux repository
        Suite: termux
        Date: Sat, 07 Oct 2023 12:00:00 +0000
        Components: extras main
        MD5Sum:
         d41d8cd98f00b204e9800998ecf8427e 0 main/binary-all/Packages
         7fdf4db15250af5368cc52a91e8edbce 738242 main/Contents-all
        SHA256:
         e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 0 main/binary-all/Packages
    "};

    #[test]
    fn parse_release() -> Result<()> {
        let release = ReleaseFile::from_reader(std::io::Cursor::new(RELEASE))?;

        assert_eq!(release.codename(), Some("termux"));
        assert_eq!(release.version(), Some("1"));
        assert_eq!(release.suite(), Some("termux"));
        assert_eq!(release.description(), Some("termux repository"));
        assert_eq!(
            release.components().unwrap().collect::<Vec<_>>(),
            vec!["extras", "main"]
        );
        assert_eq!(
            release.architectures().unwrap().collect::<Vec<_>>(),
            vec!["aarch64", "all"]
        );
        assert_eq!(
            release.date().unwrap()?,
            DateTime::parse_from_rfc3339("2023-10-07T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );

        let entries = release
            .iter_index_files(ChecksumType::Md5)
            .unwrap()
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "main/Contents-all");
        assert_eq!(entries[1].size, 738242);
        assert_eq!(
            entries[1].digest.digest_hex(),
            "7fdf4db15250af5368cc52a91e8edbce"
        );

        assert_eq!(
            release
                .iter_index_files(ChecksumType::Sha256)
                .unwrap()
                .count(),
            1
        );
        assert!(release.iter_index_files(ChecksumType::Sha1).is_none());

        Ok(())
    }

    #[test]
    fn reject_multiple_paragraphs() {
        assert!(matches!(
            ReleaseFile::from_reader(std::io::Cursor::new("Suite: a\n\nSuite: b\n")),
            Err(RepositoryError::ReleaseControlParagraphMismatch(2))
        ));
    }

    #[test]
    fn checksum_field_names() {
        assert_eq!(
            ChecksumType::all().map(|c| c.field_name()).collect::<Vec<_>>(),
            vec!["MD5Sum", "SHA1", "SHA256", "SHA512"]
        );
    }

    #[test]
    fn single_digest_path() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("Packages");
        std::fs::write(&path, b"")?;

        let (size, digest) = ChecksumType::Md5.digest_path(&path)?;
        assert_eq!(size, 0);
        assert_eq!(digest.digest_hex(), "d41d8cd98f00b204e9800998ecf8427e");

        Ok(())
    }
}
