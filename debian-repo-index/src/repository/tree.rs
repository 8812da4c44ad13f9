// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Placing packages into a distribution tree.

Every package lands in `<distribution>/<component>/binary-<arch>/` and its
installed paths are appended to `<distribution>/<component>/Contents-<arch>`.

The component of a package is the name of the input subdirectory holding it.
Packages directly in the input root go to the default component. A component's
directory is wiped the first time a build sees it, so each build fully
regenerates the components it touches.
*/

use {
    crate::{
        binary_package_control::Architecture,
        deb::PackageInspector,
        error::Result,
        repository::{
            contents::append_package_contents,
            emit,
            filesystem::{
                ensure_directory, materialize_file, relative_path_string,
                remove_directory_if_exists, strip_current_dir, MaterializeMode,
            },
            BuildEvent,
        },
    },
    log::debug,
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
};

/// Components and architectures seen during a build.
///
/// An instance is threaded through every pass of a build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildState {
    components: Vec<String>,
    architectures: BTreeSet<Architecture>,
}

impl BuildState {
    /// Register a component.
    ///
    /// Returns true if the component had not been seen before.
    pub fn register_component(&mut self, component: &str) -> bool {
        if self.has_component(component) {
            false
        } else {
            self.components.push(component.to_string());
            true
        }
    }

    /// Whether a component was seen.
    pub fn has_component(&self, component: &str) -> bool {
        self.components.iter().any(|c| c == component)
    }

    /// Register an architecture a package was placed for.
    pub fn register_architecture(&mut self, architecture: Architecture) {
        self.architectures.insert(architecture);
    }

    /// Components in the order they were first seen.
    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        self.components.iter().map(|c| c.as_str())
    }

    /// Names of architectures packages were placed for, sorted by name.
    pub fn architecture_names(&self) -> Vec<&'static str> {
        let mut names = self
            .architectures
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();

        names
    }
}

/// Describes a package placed in the tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlacedPackage {
    /// The `Package` field of the package.
    pub name: String,
    /// Component the package was placed in.
    pub component: String,
    /// Architecture of the package.
    pub architecture: Architecture,
    /// Filesystem path of the placed package file.
    pub path: PathBuf,
    /// Size in bytes of the placed package file.
    pub size: u64,
}

/// Places packages from an input directory into a distribution tree.
#[derive(Clone, Debug)]
pub struct TreeBuilder {
    input_root: PathBuf,
    distribution_root: PathBuf,
    default_component: String,
    mode: MaterializeMode,
}

impl TreeBuilder {
    /// Construct a new instance.
    ///
    /// `distribution_root` is the `dists/<distribution>` directory.
    pub fn new(
        input_root: impl AsRef<Path>,
        distribution_root: impl AsRef<Path>,
        default_component: impl ToString,
        mode: MaterializeMode,
    ) -> Self {
        Self {
            input_root: strip_current_dir(input_root),
            distribution_root: distribution_root.as_ref().to_path_buf(),
            default_component: default_component.to_string(),
            mode,
        }
    }

    /// The component a package file belongs to.
    ///
    /// `./` components are ignored when comparing against the input root, as glob
    /// results drop them.
    pub fn component_for(&self, package_path: &Path) -> String {
        match package_path.parent().map(strip_current_dir) {
            Some(parent) if parent != self.input_root => parent
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| self.default_component.clone()),
            _ => self.default_component.clone(),
        }
    }

    /// Place a package file into the tree.
    ///
    /// Unsupported architectures are rejected before anything is written for the package.
    pub fn place_package<F>(
        &self,
        state: &mut BuildState,
        inspector: &(impl PackageInspector + ?Sized),
        package_path: &Path,
        progress_cb: &Option<F>,
    ) -> Result<PlacedPackage>
    where
        F: Fn(BuildEvent),
    {
        let component = self.component_for(package_path);
        let component_dir = self.distribution_root.join(&component);

        if state.register_component(&component) {
            remove_directory_if_exists(&component_dir)?;
            emit(progress_cb, BuildEvent::ComponentReset(component.clone()));
        }

        let classification = inspector.classify(package_path)?;
        state.register_architecture(classification.architecture);

        let binary_dir = component_dir.join(classification.architecture.binary_directory());
        ensure_directory(&binary_dir)?;

        let filename = package_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        let dest = binary_dir.join(filename);

        let size = materialize_file(package_path, &dest, self.mode)?;
        emit(
            progress_cb,
            BuildEvent::PackagePlaced(relative_path_string(&self.distribution_root, &dest), size),
        );

        let files = inspector.read_file_list(package_path)?;
        let contents_path = component_dir.join(classification.architecture.contents_filename());

        let rows = append_package_contents(
            &contents_path,
            &classification.name,
            files.iter().map(|f| f.as_str()),
        )?;
        debug!(
            "{}: {} of {} paths indexed",
            classification.name,
            rows,
            files.len()
        );
        emit(
            progress_cb,
            BuildEvent::ContentsRowsAppended(
                relative_path_string(&self.distribution_root, &contents_path),
                rows,
            ),
        );

        Ok(PlacedPackage {
            name: classification.name,
            component,
            architecture: classification.architecture,
            path: dest,
            size,
        })
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{deb::builder::DebBuilder, deb::reader::DebFileInspector, error::RepositoryError},
    };

    fn write_deb(path: &Path, name: &str, arch: &str) -> Result<()> {
        let mut fh = std::fs::File::create(path)?;

        DebBuilder::new(format!(
            "Package: {}\nVersion: 1.0\nArchitecture: {}\n",
            name, arch
        ))
        .set_mtime(Some(std::time::SystemTime::UNIX_EPOCH))
        .install_file(format!("usr/bin/{}", name), b"bin".to_vec(), true)
        .install_file(format!("usr/share/doc/{}/copyright", name), b"c".to_vec(), false)
        .write(&mut fh)
    }

    #[test]
    fn component_resolution() {
        let builder = TreeBuilder::new("/in", "/out/dists/termux", "extras", MaterializeMode::Copy);

        assert_eq!(builder.component_for(Path::new("/in/foo.deb")), "extras");
        assert_eq!(builder.component_for(Path::new("/in/main/foo.deb")), "main");

        let builder = TreeBuilder::new("./in", "out/dists/termux", "extras", MaterializeMode::Copy);

        assert_eq!(builder.component_for(Path::new("in/foo.deb")), "extras");
        assert_eq!(builder.component_for(Path::new("./in/foo.deb")), "extras");
        assert_eq!(builder.component_for(Path::new("in/main/foo.deb")), "main");

        let builder = TreeBuilder::new("in/.", "out/dists/termux", "extras", MaterializeMode::Copy);

        assert_eq!(builder.component_for(Path::new("in/foo.deb")), "extras");
    }

    #[test]
    fn place_packages() -> Result<()> {
        let td = tempfile::tempdir()?;
        let input = td.path().join("input");
        let dist = td.path().join("dists").join("termux");
        ensure_directory(input.join("main"))?;

        write_deb(&input.join("foo.deb"), "foo", "all")?;
        write_deb(&input.join("main").join("bar.deb"), "bar", "aarch64")?;
        write_deb(&input.join("main").join("baz.deb"), "baz", "aarch64")?;

        // Stale content in a component is removed on first sight.
        ensure_directory(dist.join("main").join("binary-arm"))?;
        std::fs::write(dist.join("main").join("binary-arm").join("old.deb"), b"")?;

        let builder = TreeBuilder::new(&input, &dist, "extras", MaterializeMode::Copy);
        let inspector = DebFileInspector::default();
        let mut state = BuildState::default();
        let events = std::cell::RefCell::new(vec![]);
        let cb = Some(|event: BuildEvent| events.borrow_mut().push(event));

        let placed = builder.place_package(&mut state, &inspector, &input.join("foo.deb"), &cb)?;
        assert_eq!(placed.component, "extras");
        assert_eq!(placed.architecture, Architecture::All);
        assert!(dist.join("extras/binary-all/foo.deb").is_file());

        builder.place_package(&mut state, &inspector, &input.join("main/bar.deb"), &cb)?;
        builder.place_package(&mut state, &inspector, &input.join("main/baz.deb"), &cb)?;

        assert!(!dist.join("main/binary-arm").exists());
        assert_eq!(state.components().collect::<Vec<_>>(), vec!["extras", "main"]);
        assert_eq!(state.architecture_names(), vec!["aarch64", "all"]);

        let contents = std::fs::read_to_string(dist.join("main/Contents-aarch64"))?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("usr/bin/bar "));
        assert!(lines[0].ends_with(" bar"));
        assert!(lines[3].starts_with("usr/share/doc/baz/copyright "));

        let events = events.into_inner();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, BuildEvent::ComponentReset(_)))
                .count(),
            2
        );
        assert!(events.contains(&BuildEvent::ContentsRowsAppended(
            "main/Contents-aarch64".into(),
            2
        )));

        Ok(())
    }

    #[test]
    fn unsupported_architecture_writes_nothing() -> Result<()> {
        let td = tempfile::tempdir()?;
        let input = td.path().join("input");
        let dist = td.path().join("dists").join("termux");
        ensure_directory(&input)?;
        write_deb(&input.join("x.deb"), "x", "x86_64")?;

        let builder = TreeBuilder::new(&input, &dist, "extras", MaterializeMode::HardLink);
        let mut state = BuildState::default();

        let res = builder.place_package(
            &mut state,
            &DebFileInspector::default(),
            &input.join("x.deb"),
            &None::<fn(BuildEvent)>,
        );
        assert!(matches!(res, Err(RepositoryError::PackageRead(name, _)) if name == "x.deb"));
        assert!(!dist.join("extras").exists());

        Ok(())
    }
}
