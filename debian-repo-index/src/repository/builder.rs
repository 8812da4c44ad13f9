// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build Debian repositories from directories of `.deb` files. */

use {
    crate::{
        deb::PackageInspector,
        error::{RepositoryError, Result},
        repository::{
            emit,
            filesystem::{
                ensure_directory, relative_path_string, remove_file_if_exists, sorted_glob_files,
                MaterializeMode,
            },
            manifest::ReleaseManifest,
            packages::write_component_indices,
            release::ChecksumType,
            tree::{BuildState, PlacedPackage, TreeBuilder},
            BuildEvent,
        },
        signing::ReleaseSigner,
    },
    chrono::{DateTime, Utc},
    log::warn,
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

/// Configuration of a repository build.
///
/// Every field has a default, so a configuration can be deserialized from a
/// partial document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryBuilderConfig {
    /// Directory to find `.deb` files in, directly and one subdirectory deep.
    pub input_path: PathBuf,

    /// Repository root directory. The distribution is written under `dists/`.
    pub output_path: PathBuf,

    /// Name of the distribution directory. Also the `Suite` field.
    pub distribution: String,

    /// Component for packages directly in the input directory.
    pub default_component: String,

    /// Hard link packages into the repository instead of copying them.
    pub use_hard_links: bool,

    /// Sign the `Release` file, producing `InRelease`.
    pub sign: bool,

    /// Value of the `Codename` field. Defaults to the distribution.
    pub codename: Option<String>,

    /// Value of the `Version` field.
    pub version: String,

    /// Value of the `Description` field. Defaults to `<distribution> repository`.
    pub description: Option<String>,

    /// Checksum flavors recorded in `Packages` and `Release` files.
    pub checksums: Vec<ChecksumType>,

    /// Key to sign with. The signer's default key is used otherwise.
    pub gpg_key: Option<String>,
}

impl Default for RepositoryBuilderConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: PathBuf::new(),
            distribution: "termux".to_string(),
            default_component: "extras".to_string(),
            use_hard_links: false,
            sign: false,
            codename: None,
            version: "1".to_string(),
            description: None,
            checksums: ChecksumType::all().collect(),
            gpg_key: None,
        }
    }
}

impl RepositoryBuilderConfig {
    /// The `dists/<distribution>` directory.
    pub fn distribution_root(&self) -> PathBuf {
        self.output_path.join("dists").join(&self.distribution)
    }

    /// The effective `Codename` value.
    pub fn codename(&self) -> &str {
        self.codename.as_deref().unwrap_or(&self.distribution)
    }

    /// The effective `Description` value.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} repository", self.distribution))
    }
}

/// Describes the outcome of a repository build.
#[derive(Clone, Debug)]
pub struct BuildReport {
    /// Packages placed, in processing order.
    pub packages: Vec<PlacedPackage>,

    /// Components rebuilt by this build, in the order they were first seen.
    pub touched_components: Vec<String>,

    /// Components listed in the `Release` file.
    pub components: Vec<String>,

    /// Architectures listed in the `Release` file.
    pub architectures: Vec<String>,

    /// Path of the `Release` file.
    pub release_path: PathBuf,

    /// Path of the `InRelease` file, if signing succeeded.
    pub inrelease_path: Option<PathBuf>,
}

/// Build a Debian repository from a directory of `.deb` files.
///
/// # Usage
///
/// Construct an instance from a [RepositoryBuilderConfig], optionally pin the
/// `Date` field with [Self::set_date()], then call [Self::build()].
///
/// A build runs these passes in order:
///
/// 1. Discover `<input>/*.deb` then `<input>/*/*.deb`.
/// 2. Place every package into the tree, recording components and architectures.
/// 3. Write `Packages` and compressed indices for every component placed into.
/// 4. Write the `Release` file over every component on disk.
/// 5. If requested, sign the `Release` file.
///
/// Nothing is written when the input is unusable. Any other failure aborts the
/// build, leaving whatever was already written. Signing failure is the exception:
/// it is reported and the build succeeds without an `InRelease` file.
#[derive(Clone, Debug)]
pub struct RepositoryBuilder {
    config: RepositoryBuilderConfig,
    date: Option<DateTime<Utc>>,
}

impl RepositoryBuilder {
    /// Construct a new instance from a config.
    pub fn new(config: RepositoryBuilderConfig) -> Self {
        Self { config, date: None }
    }

    /// Set the time the repository was created.
    ///
    /// If not called, the time of [Self::build()] is used.
    pub fn set_date(&mut self, value: DateTime<Utc>) {
        self.date = Some(value);
    }

    /// Resolve the package files to index, in processing order.
    ///
    /// Fails if the input directory is missing or holds no packages.
    pub fn discover_packages(&self) -> Result<Vec<PathBuf>> {
        let input = &self.config.input_path;

        if !input.is_dir() {
            return Err(RepositoryError::InputPathMissing(
                input.display().to_string(),
            ));
        }

        let mut packages = sorted_glob_files(input, "*.deb")?;
        packages.extend(sorted_glob_files(input, "*/*.deb")?);

        if packages.is_empty() {
            return Err(RepositoryError::NoPackagesFound(
                input.display().to_string(),
            ));
        }

        Ok(packages)
    }

    fn release_manifest(&self, state: &BuildState) -> ReleaseManifest {
        ReleaseManifest {
            codename: self.config.codename().to_string(),
            suite: self.config.distribution.clone(),
            version: self.config.version.clone(),
            description: self.config.description(),
            architectures: state
                .architecture_names()
                .into_iter()
                .map(|a| a.to_string())
                .collect(),
            date: self.date.unwrap_or_else(Utc::now),
            checksums: self.config.checksums.clone(),
        }
    }

    fn sign_release<F>(
        &self,
        signer: Option<&dyn ReleaseSigner>,
        release_path: &Path,
        progress_cb: &Option<F>,
    ) -> Result<Option<PathBuf>>
    where
        F: Fn(BuildEvent),
    {
        let dest = release_path.with_file_name("InRelease");

        let res = match signer {
            Some(signer) => signer.sign(release_path, &dest),
            None => Err(RepositoryError::SignerNotFound(
                "no signer available".to_string(),
            )),
        };

        match res {
            Ok(()) => {
                emit(
                    progress_cb,
                    BuildEvent::ReleaseSigned(relative_path_string(
                        &self.config.output_path,
                        &dest,
                    )),
                );
                Ok(Some(dest))
            }
            Err(e) => {
                warn!("unable to sign {}: {}", release_path.display(), e);
                // A partial signature would not verify.
                remove_file_if_exists(&dest)?;
                emit(progress_cb, BuildEvent::SigningFailed(e.to_string()));
                Ok(None)
            }
        }
    }

    /// Build the repository.
    ///
    /// `signer` is only consulted if signing is enabled in the config.
    pub fn build<F>(
        &self,
        inspector: &(impl PackageInspector + ?Sized),
        signer: Option<&dyn ReleaseSigner>,
        progress_cb: &Option<F>,
    ) -> Result<BuildReport>
    where
        F: Fn(BuildEvent),
    {
        let packages = self.discover_packages()?;
        emit(progress_cb, BuildEvent::PackagesDiscovered(packages.len()));

        let repository_root = &self.config.output_path;
        let distribution_root = self.config.distribution_root();
        ensure_directory(&distribution_root)?;

        let tree = TreeBuilder::new(
            &self.config.input_path,
            &distribution_root,
            &self.config.default_component,
            MaterializeMode::from_hard_links(self.config.use_hard_links),
        );

        let mut state = BuildState::default();
        let mut placed = vec![];

        for package in &packages {
            placed.push(tree.place_package(&mut state, inspector, package, progress_cb)?);
        }

        for component in state.components() {
            write_component_indices(
                inspector,
                repository_root,
                &distribution_root.join(component),
                &self.config.checksums,
                progress_cb,
            )?;
        }

        let manifest = self.release_manifest(&state);
        let release_path = manifest.write(&distribution_root)?;
        emit(
            progress_cb,
            BuildEvent::ReleaseWritten(relative_path_string(repository_root, &release_path)),
        );

        let inrelease_path = if self.config.sign {
            self.sign_release(signer, &release_path, progress_cb)?
        } else {
            None
        };

        Ok(BuildReport {
            packages: placed,
            touched_components: state.components().map(|c| c.to_string()).collect(),
            components: ReleaseManifest::components(&distribution_root)?,
            architectures: manifest.architectures,
            release_path,
            inrelease_path,
        })
    }
}
