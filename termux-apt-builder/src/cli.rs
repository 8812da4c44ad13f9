// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    debian_repo_index::{
        deb::reader::DebFileInspector,
        error::RepositoryError,
        repository::{
            builder::{RepositoryBuilder, RepositoryBuilderConfig},
            BuildEvent,
        },
        signing::{GpgSigner, ReleaseSigner},
    },
    log::{info, warn, LevelFilter},
    std::{ffi::OsString, path::PathBuf},
    thiserror::Error,
};

const ABOUT: &str = "\
Build an APT repository from a directory of .deb files.

Packages directly in the input directory are published in the default
component. Packages in a subdirectory of the input directory are published
in the component named after that subdirectory. Each component published by
a run is rebuilt from scratch. Components already in the output directory
but absent from the input are kept.

The repository is written to <output>/dists/<distribution>/ and contains,
per component and architecture:

   <component>/binary-<arch>/*.deb
   <component>/binary-<arch>/Packages[.xz]
   <component>/Contents-<arch>[.xz]

plus a Release file (and InRelease if signed) covering every index file.

Supported architectures are all, arm and aarch64.

# YAML Configuration

A YAML file can provide the configuration. Command line arguments take
precedence over values in the file. The document can have the following keys:

input_path (string)
   Directory holding .deb files.

output_path (string)
   Repository root directory.

distribution (string)
   Distribution name. Defaults to `termux`.

default_component (string)
   Component of packages directly in the input directory. Defaults to `extras`.

use_hard_links (bool)
   Hard link packages instead of copying them.

sign (bool)
   Sign the Release file with gpg.

gpg_key (string)
   Key to sign with. Defaults to the default key of the keyring.

codename (string)
   Codename field of the Release file. Defaults to the distribution.

version (string)
   Version field of the Release file. Defaults to `1`.

description (string)
   Description field of the Release file. Defaults to `<distribution> repository`.

checksums (list[string])
   Digests to record, from md5, sha1, sha256 and sha512. Defaults to all.
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Version banner.
pub fn version_banner() -> String {
    format!(
        "termux-apt-builder v{}\nby {}",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS")
    )
}

fn command() -> Command<'static> {
    Command::new("termux-apt-builder")
        .about("Build an APT repository from .deb files")
        .long_about(ABOUT)
        .disable_version_flag(true)
        .arg(
            Arg::new("input")
                .long("input")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("Directory holding .deb files"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("Directory to write the repository to"),
        )
        .arg(
            Arg::new("distribution")
                .long("distribution")
                .takes_value(true)
                .help("Name of the distribution [default: termux]"),
        )
        .arg(
            Arg::new("component")
                .long("component")
                .takes_value(true)
                .help("Component of packages directly in the input directory [default: extras]"),
        )
        .arg(
            Arg::new("use-hard-links")
                .long("use-hard-links")
                .help("Hard link packages into the repository instead of copying them"),
        )
        .arg(
            Arg::new("sign")
                .long("sign")
                .help("Sign the Release file with gpg"),
        )
        .arg(
            Arg::new("gpg-key")
                .long("gpg-key")
                .takes_value(true)
                .help("Key to sign with"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("Path to a YAML file defining the build configuration"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version information and exit"),
        )
}

/// Parse command line arguments.
///
/// Returns [None] if help was requested and printed.
fn parse_args<I, T>(args: I) -> Result<Option<ArgMatches>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match command().try_get_matches_from(args) {
        Ok(matches) => Ok(Some(matches)),
        Err(e) if e.kind() == clap::ErrorKind::DisplayHelp => {
            e.print()?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the build configuration from arguments and an optional YAML file.
fn resolve_config(args: &ArgMatches) -> Result<RepositoryBuilderConfig> {
    let mut config = if let Some(path) = args.value_of_os("config") {
        let f = std::fs::File::open(path)?;
        serde_yaml::from_reader(f)?
    } else {
        RepositoryBuilderConfig::default()
    };

    if let Some(value) = args.value_of_os("input") {
        config.input_path = PathBuf::from(value);
    }
    if let Some(value) = args.value_of_os("output") {
        config.output_path = PathBuf::from(value);
    }
    if let Some(value) = args.value_of("distribution") {
        config.distribution = value.to_string();
    }
    if let Some(value) = args.value_of("component") {
        config.default_component = value.to_string();
    }
    if args.is_present("use-hard-links") {
        config.use_hard_links = true;
    }
    if args.is_present("sign") {
        config.sign = true;
    }
    if let Some(value) = args.value_of("gpg-key") {
        config.gpg_key = Some(value.to_string());
    }

    if config.input_path.as_os_str().is_empty() {
        return Err(CliError::Usage("--input is required".to_string()));
    }
    if config.output_path.as_os_str().is_empty() {
        return Err(CliError::Usage("--output is required".to_string()));
    }

    Ok(config)
}

/// Text telling users how to consume the repository.
fn post_build_instructions(
    config: &RepositoryBuilderConfig,
    components: &[String],
) -> String {
    let mut lines = vec![
        "Done!".to_string(),
        "".to_string(),
        format!(
            "Make the {} directory accessible at $REPO_URL",
            config.output_path.display()
        ),
        "".to_string(),
        "Users can then access the repo by adding a file at".to_string(),
        "   $PREFIX/etc/apt/sources.list.d".to_string(),
        "containing:".to_string(),
    ];

    for component in components {
        lines.push(format!(
            "   deb [trusted=yes] $REPO_URL {} {}",
            config.distribution, component
        ));
    }

    lines.push("".to_string());
    lines.push(
        "[trusted=yes] is not needed if the repo has been signed with a gpg key".to_string(),
    );

    lines.join("\n")
}

fn init_logger(verbosity: u64) {
    let log_level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();
}

fn command_build(config: &RepositoryBuilderConfig) -> Result<Vec<String>> {
    let signer = if config.sign {
        match GpgSigner::find(config.gpg_key.clone()) {
            Ok(signer) => Some(signer),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    } else {
        None
    };

    let builder = RepositoryBuilder::new(config.clone());

    let cb = |event: BuildEvent| info!("{}", event);

    let report = builder.build(
        &DebFileInspector::default(),
        signer.as_ref().map(|s| s as &dyn ReleaseSigner),
        &Some(cb),
    )?;

    Ok(report.components)
}

/// Whether `--version` appears in raw arguments, ahead of any `--` terminator.
///
/// The first argument is the program name.
fn version_requested(args: &[OsString]) -> bool {
    args.iter()
        .skip(1)
        .take_while(|arg| *arg != "--")
        .any(|arg| arg == "--version")
}

pub fn run_cli() -> Result<()> {
    let args = std::env::args_os().collect::<Vec<_>>();

    // Honored before argument validation.
    if version_requested(&args) {
        println!("{}", version_banner());
        return Ok(());
    }

    let matches = match parse_args(args)? {
        Some(matches) => matches,
        None => return Ok(()),
    };

    init_logger(matches.occurrences_of("verbose"));

    let config = resolve_config(&matches)?;
    let components = command_build(&config)?;

    println!("{}", post_build_instructions(&config, &components));

    Ok(())
}
