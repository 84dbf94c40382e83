//! Generation-specific invocation details.
//!
//! Everything that differs between engine generations lives behind
//! [`InvocationFlavor`], chosen once when the engine handle is built.

use super::version::Generation;
use crate::error::Result;
use crate::invoker::Invocation;
use crate::keyring::KeyringKind;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Agent configuration written into the scratch home for loopback engines
pub const AGENT_CONF: &str = "gpg-agent.conf";
const AGENT_CONF_CONTENT: &str = "allow-loopback-pinentry\n";

/// How one engine generation is driven
pub trait InvocationFlavor: fmt::Debug + Send + Sync {
    fn generation(&self) -> Generation;

    /// Prepare a freshly created scratch home
    fn prepare_home(&self, home: &Path) -> Result<()>;

    /// Flags that make the engine read the passphrase from the first input line
    fn passphrase_args(&self) -> Vec<OsString>;

    /// Flags that point the engine at a keyring of the given kind
    fn keyring_args(&self, kind: KeyringKind, path: &Path) -> Vec<OsString>;

    /// Command used to load key blobs into a keyring
    fn import_command(&self) -> &'static str;

    /// Flags that list the keys contained in a file in colon format
    fn fingerprint_listing_args(&self, file: &Path) -> Vec<OsString>;

    /// Whether key generation writes straight into caller-named keyring files
    fn keygen_writes_keyrings(&self) -> bool;

    /// Call that drops passphrases the agent cached during the previous call
    fn forget_passphrases(&self, binary: &Path, home: &Path) -> Option<Invocation>;

    /// Call to run when the scratch home is torn down
    fn teardown(&self, binary: &Path, home: &Path) -> Option<Invocation>;
}

/// GnuPG 1.x and 2.0: secret keyring files, `--passphrase-fd` on its own
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyFlavor;

/// GnuPG 2.1.12 and later: agent-held secrets, loopback pinentry
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackFlavor;

/// Flavor for a detected generation
pub fn flavor_for(generation: Generation) -> Box<dyn InvocationFlavor> {
    match generation {
        Generation::Legacy => Box::new(LegacyFlavor),
        Generation::Loopback => Box::new(LoopbackFlavor),
    }
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

impl InvocationFlavor for LegacyFlavor {
    fn generation(&self) -> Generation {
        Generation::Legacy
    }

    fn prepare_home(&self, _home: &Path) -> Result<()> {
        Ok(())
    }

    fn passphrase_args(&self) -> Vec<OsString> {
        os_args(&["--passphrase-fd", "0"])
    }

    fn keyring_args(&self, kind: KeyringKind, path: &Path) -> Vec<OsString> {
        let flag = match kind {
            KeyringKind::Public => "--keyring",
            KeyringKind::Private => "--secret-keyring",
        };
        vec![flag.into(), path.as_os_str().to_os_string()]
    }

    fn import_command(&self) -> &'static str {
        "--fast-import"
    }

    fn fingerprint_listing_args(&self, file: &Path) -> Vec<OsString> {
        let mut args = os_args(&["--with-colons", "--with-fingerprint"]);
        args.push(file.as_os_str().to_os_string());
        args
    }

    fn keygen_writes_keyrings(&self) -> bool {
        true
    }

    fn forget_passphrases(&self, _binary: &Path, _home: &Path) -> Option<Invocation> {
        None
    }

    fn teardown(&self, _binary: &Path, _home: &Path) -> Option<Invocation> {
        None
    }
}

impl InvocationFlavor for LoopbackFlavor {
    fn generation(&self) -> Generation {
        Generation::Loopback
    }

    fn prepare_home(&self, home: &Path) -> Result<()> {
        fs::write(home.join(AGENT_CONF), AGENT_CONF_CONTENT)?;
        Ok(())
    }

    fn passphrase_args(&self) -> Vec<OsString> {
        os_args(&["--pinentry-mode", "loopback", "--passphrase-fd", "0"])
    }

    fn keyring_args(&self, kind: KeyringKind, path: &Path) -> Vec<OsString> {
        // Secret keys live with the agent inside the home; the file is never consulted.
        match kind {
            KeyringKind::Public => vec!["--keyring".into(), path.as_os_str().to_os_string()],
            KeyringKind::Private => Vec::new(),
        }
    }

    fn import_command(&self) -> &'static str {
        "--import"
    }

    fn fingerprint_listing_args(&self, file: &Path) -> Vec<OsString> {
        let mut args = os_args(&[
            "--with-colons",
            "--with-fingerprint",
            "--import-options",
            "show-only",
            "--import",
        ]);
        args.push(file.as_os_str().to_os_string());
        args
    }

    fn keygen_writes_keyrings(&self) -> bool {
        false
    }

    fn forget_passphrases(&self, binary: &Path, home: &Path) -> Option<Invocation> {
        // A reload makes the agent flush its passphrase cache
        Some(agent_control(binary, home, "--reload"))
    }

    fn teardown(&self, binary: &Path, home: &Path) -> Option<Invocation> {
        Some(agent_control(binary, home, "--kill"))
    }
}

fn agent_control(binary: &Path, home: &Path, command: &str) -> Invocation {
    Invocation::bare()
        .program(gpgconf_for(binary))
        .arg("--homedir")
        .arg(home)
        .args([command, "gpg-agent"])
}

/// `gpgconf` installed next to the engine binary, or the one on `PATH`
fn gpgconf_for(binary: &Path) -> PathBuf {
    match binary.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("gpgconf"),
        _ => PathBuf::from("gpgconf"),
    }
}
