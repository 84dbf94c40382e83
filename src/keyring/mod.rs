//! Ephemeral keyring management for engine operations.
//!
//! Each engine handle owns at most one public and one private keyring inside
//! its scratch directory. They are created empty on first use and every
//! import appends to them; they are a scratch cache and disappear with the
//! scratch directory.

use crate::engine::InvocationFlavor;
use crate::error::{GpgError, Result};
use crate::invoker::{status, Invocation, Invoker};
use crate::validation::Validator;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

/// Which keyring a key belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyringKind {
    Public,
    Private,
}

impl KeyringKind {
    /// File name of this keyring inside the scratch directory
    pub fn file_name(self) -> &'static str {
        match self {
            KeyringKind::Public => "pubring.gpg",
            KeyringKind::Private => "secring.gpg",
        }
    }
}

impl fmt::Display for KeyringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringKind::Public => f.write_str("public"),
            KeyringKind::Private => f.write_str("private"),
        }
    }
}

/// A keyring file, ready to be handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringRef {
    kind: KeyringKind,
    path: PathBuf,
    args: Vec<OsString>,
}

impl KeyringRef {
    pub fn kind(&self) -> KeyringKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Command-line arguments selecting this keyring
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

/// Result of loading key blobs into a keyring
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// Keyring the keys were loaded into
    pub keyring: KeyringRef,
    /// Fingerprints the engine reported as imported, in report order
    pub fingerprints: Vec<String>,
}

impl ImportOutcome {
    /// First fingerprint the engine confirmed
    pub fn primary_fingerprint(&self) -> Option<&str> {
        self.fingerprints.first().map(String::as_str)
    }
}

/// The scratch keyrings of one engine handle
#[derive(Debug)]
pub struct KeyringManager {
    dir: PathBuf,
    public: Option<PathBuf>,
    private: Option<PathBuf>,
}

impl KeyringManager {
    /// Manage keyrings inside the given scratch directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            public: None,
            private: None,
        }
    }

    /// Path of a keyring, if it has been created
    pub fn keyring(&self, kind: KeyringKind) -> Option<&Path> {
        match kind {
            KeyringKind::Public => self.public.as_deref(),
            KeyringKind::Private => self.private.as_deref(),
        }
    }

    /// Return the keyring of the given kind, creating an empty file on first request
    pub fn ensure_keyring(
        &mut self,
        kind: KeyringKind,
        flavor: &dyn InvocationFlavor,
    ) -> Result<KeyringRef> {
        let slot = match kind {
            KeyringKind::Public => &mut self.public,
            KeyringKind::Private => &mut self.private,
        };

        let path = match slot {
            Some(path) => path.clone(),
            None => {
                let path = self.dir.join(kind.file_name());
                fs::File::create(&path).map_err(|e| {
                    GpgError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to create {} keyring: {}", kind, e),
                    ))
                })?;
                debug!(kind = %kind, path = %path.display(), "Created scratch keyring");
                *slot = Some(path.clone());
                path
            }
        };

        Ok(KeyringRef {
            kind,
            args: flavor.keyring_args(kind, &path),
            path,
        })
    }

    /// Load key blobs into the keyring of the given kind.
    ///
    /// Private keys are additionally loaded into the public keyring: engines
    /// that keep secrets with their agent do not consult a separate secret
    /// keyring on import, so later calls only find the key when both
    /// keyrings hold it. Importing nothing is a no-op that still returns a
    /// usable keyring.
    pub fn import_keys(
        &mut self,
        invoker: &dyn Invoker,
        flavor: &dyn InvocationFlavor,
        base: &Invocation,
        keys: &[&[u8]],
        kind: KeyringKind,
    ) -> Result<ImportOutcome> {
        let public = self.ensure_keyring(KeyringKind::Public, flavor)?;
        let keyring = match kind {
            KeyringKind::Public => public.clone(),
            KeyringKind::Private => self.ensure_keyring(KeyringKind::Private, flavor)?,
        };

        if keys.is_empty() {
            return Ok(ImportOutcome {
                keyring,
                fingerprints: Vec::new(),
            });
        }

        let staged = keys
            .iter()
            .map(|key| {
                Validator::validate_key_size(key)?;
                stage_key(&self.dir, key)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut targets: Vec<OsString> = public.args().to_vec();
        if kind == KeyringKind::Private {
            targets.extend(keyring.args().iter().cloned());
        }

        let mut fingerprints = run_import(invoker, flavor, base, &targets, &staged)?;
        if kind == KeyringKind::Private {
            for fingerprint in run_import(invoker, flavor, base, public.args(), &staged)? {
                if !fingerprints.contains(&fingerprint) {
                    fingerprints.push(fingerprint);
                }
            }
        }

        debug!(
            kind = %kind,
            keys = keys.len(),
            imported = fingerprints.len(),
            "Imported keys into scratch keyring"
        );

        Ok(ImportOutcome {
            keyring,
            fingerprints,
        })
    }
}

fn stage_key(dir: &Path, key: &[u8]) -> Result<NamedTempFile> {
    let mut file = Builder::new().prefix("key-").tempfile_in(dir)?;
    file.write_all(key)?;
    file.flush()?;
    Ok(file)
}

/// One import call; returns the fingerprints confirmed by `IMPORT_OK`
fn run_import(
    invoker: &dyn Invoker,
    flavor: &dyn InvocationFlavor,
    base: &Invocation,
    keyring_args: &[OsString],
    staged: &[NamedTempFile],
) -> Result<Vec<String>> {
    let invocation = base
        .clone()
        .args(keyring_args)
        .arg(flavor.import_command())
        .args(staged.iter().map(NamedTempFile::path))
        .capture_stderr();
    let result = invoker.invoke(&invocation)?;

    let mut fingerprints = Vec::new();
    for line in result.status.all(status::IMPORT_OK) {
        if let Some(fingerprint) = line.arg(1) {
            if !fingerprints.iter().any(|f| f == fingerprint) {
                fingerprints.push(fingerprint.to_string());
            }
        }
    }

    if fingerprints.is_empty() && !result.succeeded() {
        warn!(
            exit_code = ?result.exit_code,
            diagnostics = result.diagnostics(),
            "Engine imported no keys"
        );
    }

    Ok(fingerprints)
}
