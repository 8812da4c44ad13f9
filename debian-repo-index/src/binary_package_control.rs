// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package control files. */

use {
    crate::{
        control::{parse_first_paragraph, ControlParagraph},
        error::{RepositoryError, Result},
    },
    std::{
        ops::{Deref, DerefMut},
        str::FromStr,
    },
    strum::{EnumIter, EnumString, IntoStaticStr},
};

/// A machine architecture packages can be published for.
///
/// Only this set is accepted by the repository builder. Packages declaring
/// anything else are rejected.
#[derive(
    Clone, Copy, Debug, EnumIter, EnumString, Eq, Hash, IntoStaticStr, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "lowercase")]
pub enum Architecture {
    /// Architecture independent packages.
    All,
    /// 32-bit ARM.
    Arm,
    /// 64-bit ARM.
    Aarch64,
}

impl Architecture {
    /// The name of this architecture as it appears in control files and paths.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Name of the directory holding packages of this architecture.
    ///
    /// e.g. `binary-aarch64`.
    pub fn binary_directory(&self) -> String {
        format!("binary-{}", self.as_str())
    }

    /// Name of the content index file for this architecture.
    ///
    /// e.g. `Contents-aarch64`.
    pub fn contents_filename(&self) -> String {
        format!("Contents-{}", self.as_str())
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Debian binary package control file/paragraph.
///
/// See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>.
///
/// Binary package control files are defined by a single paragraph with well-defined
/// fields. This type is a low-level wrapper around an inner [ControlParagraph].
/// [Deref] and [DerefMut] can be used to operate on the inner [ControlParagraph].
/// [From] and [Into] are implemented in both directions to enable cheap coercion
/// between the types.
///
/// Fields annotated as *mandatory* in the Debian Policy Manual have getters that
/// return [Result] and will error if a field is not present. Non-mandatory fields
/// return [Option].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BinaryPackageControlFile<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for BinaryPackageControlFile<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for BinaryPackageControlFile<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for BinaryPackageControlFile<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<BinaryPackageControlFile<'a>> for ControlParagraph<'a> {
    fn from(cf: BinaryPackageControlFile<'a>) -> Self {
        cf.paragraph
    }
}

impl BinaryPackageControlFile<'static> {
    /// Parse an instance from the text of a `control` file.
    ///
    /// Only the first paragraph is considered.
    pub fn parse_str(data: &str) -> Result<Self> {
        Ok(parse_first_paragraph(data)?.into())
    }
}

impl<'a> BinaryPackageControlFile<'a> {
    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Architecture` field resolved to a supported [Architecture].
    ///
    /// `filename` is only used to give context to the error for unsupported values.
    pub fn supported_architecture(&self, filename: &str) -> Result<Architecture> {
        let arch = self.architecture()?;

        Architecture::from_str(arch).map_err(|_| {
            RepositoryError::UnsupportedArchitecture(arch.to_string(), filename.to_string())
        })
    }
}
