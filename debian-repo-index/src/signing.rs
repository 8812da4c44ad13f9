// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of `Release` files.

A signed repository carries an `InRelease` file next to `Release`: the same
content wrapped in a PGP cleartext signature. Producing the signature is
delegated to a [ReleaseSigner].
*/

use {
    crate::error::{RepositoryError, Result},
    duct::cmd,
    log::{debug, warn},
    std::{
        io::{BufRead, BufReader},
        path::{Path, PathBuf},
    },
};

/// Produces a clear-signed copy of a `Release` file.
pub trait ReleaseSigner {
    /// Sign the file at `release`, writing the signed document to `dest`.
    fn sign(&self, release: &Path, dest: &Path) -> Result<()>;
}

/// A [ReleaseSigner] invoking the `gpg` executable.
///
/// The default key of the user's keyring is used unless a key is configured.
#[derive(Clone, Debug)]
pub struct GpgSigner {
    program: PathBuf,
    key: Option<String>,
}

impl GpgSigner {
    /// Construct an instance using the `gpg` found on `PATH`.
    pub fn find(key: Option<String>) -> Result<Self> {
        let program = which::which("gpg")
            .map_err(|e| RepositoryError::SignerNotFound(format!("gpg: {}", e)))?;

        Ok(Self::new(program, key))
    }

    /// Construct an instance using an explicit program path.
    pub fn new(program: impl AsRef<Path>, key: Option<String>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            key,
        }
    }

    /// Arguments to pass to the program.
    pub fn arguments(&self, release: &Path, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "--yes".to_string(),
            "--pinentry-mode".to_string(),
            "loopback".to_string(),
            "--digest-algo".to_string(),
            "SHA256".to_string(),
        ];

        if let Some(key) = &self.key {
            args.push("--local-user".to_string());
            args.push(key.clone());
        }

        args.extend([
            "--clearsign".to_string(),
            "-o".to_string(),
            dest.display().to_string(),
            release.display().to_string(),
        ]);

        args
    }
}

impl ReleaseSigner for GpgSigner {
    fn sign(&self, release: &Path, dest: &Path) -> Result<()> {
        let args = self.arguments(release, dest);
        debug!("running {} {}", self.program.display(), args.join(" "));

        let command = cmd(&self.program, &args)
            .stderr_to_stdout()
            .unchecked()
            .reader()
            .map_err(|e| RepositoryError::SigningFailed(e.to_string()))?;

        let mut messages = vec![];
        {
            let reader = BufReader::new(&command);
            for line in reader.lines() {
                let line = line.map_err(|e| RepositoryError::SigningFailed(e.to_string()))?;
                warn!("gpg: {}", line);
                messages.push(line);
            }
        }

        let output = command
            .try_wait()
            .map_err(|e| RepositoryError::SigningFailed(e.to_string()))?
            .ok_or_else(|| RepositoryError::SigningFailed("unable to wait on gpg".to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RepositoryError::SigningFailed(format!(
                "gpg exited with {}: {}",
                output.status,
                messages.join("; ")
            )))
        }
    }
}
