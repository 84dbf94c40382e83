//! The engine handle: one external engine, one private scratch home.
//!
//! Construction queries the engine version once, refuses known-broken
//! versions before anything is written to disk, then creates the scratch
//! home and picks the [`InvocationFlavor`] every later call goes through.
//! Dropping the handle tears the scratch home down.

pub mod config;
pub mod flavor;
pub mod version;

pub use config::EngineConfig;
pub use flavor::{flavor_for, InvocationFlavor, LegacyFlavor, LoopbackFlavor};
pub use version::{EngineVersion, Generation};

use crate::error::{GpgError, Result};
use crate::invoker::{Invocation, InvocationResult, Invoker, IoMode, ProcessInvoker};
use crate::keyring::{ImportOutcome, KeyringKind, KeyringManager, KeyringRef};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::{debug, info, trace, warn};

const SCRATCH_PREFIX: &str = "gpgbridge-";

/// Session-wide handle on the external engine.
///
/// Operations take `&mut self`: the scratch keyrings are shared mutable
/// state, so one handle serves one operation sequence at a time. Separate
/// handles share nothing and may run in parallel.
pub struct GpgEngine {
    config: EngineConfig,
    version: EngineVersion,
    invoker: Arc<dyn Invoker>,
    flavor: Box<dyn InvocationFlavor>,
    keyrings: KeyringManager,
    // Declared last so it is removed after everything that points into it
    scratch: TempDir,
}

impl GpgEngine {
    /// Start a handle on the configured engine binary
    pub fn new(config: EngineConfig) -> Result<Self> {
        let invoker = ProcessInvoker::new(config.binary.clone())
            .with_extra_args(config.extra_args.clone())
            .with_timeout(config.timeout());
        Self::with_invoker(config, Arc::new(invoker))
    }

    /// Start a handle that runs every call through the given invoker
    pub fn with_invoker(config: EngineConfig, invoker: Arc<dyn Invoker>) -> Result<Self> {
        config.validate()?;

        let version = detect_version(invoker.as_ref())?;
        let flavor = flavor_for(version.generation()?);

        let mut builder = Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match &config.scratch_base {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        restrict_to_owner(scratch.path())?;
        flavor.prepare_home(scratch.path())?;

        info!(
            version = %version,
            generation = ?flavor.generation(),
            home = %scratch.path().display(),
            "Engine ready"
        );

        Ok(Self {
            keyrings: KeyringManager::new(scratch.path()),
            config,
            version,
            invoker,
            flavor,
            scratch,
        })
    }

    pub fn version(&self) -> EngineVersion {
        self.version
    }

    pub fn generation(&self) -> Generation {
        self.flavor.generation()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Private scratch home passed to every engine call
    pub fn home(&self) -> &Path {
        self.scratch.path()
    }

    pub(crate) fn flavor(&self) -> &dyn InvocationFlavor {
        self.flavor.as_ref()
    }

    /// Fresh engine call rooted at the scratch home
    pub(crate) fn invocation(&self) -> Invocation {
        Invocation::engine(self.home()).verbose(self.config.verbose)
    }

    /// Run one engine call. Calls that fed the engine a passphrase are
    /// followed by an agent cache flush, so the next call has to supply its own.
    pub(crate) fn run(&self, invocation: &Invocation) -> Result<InvocationResult> {
        let result = self.invoker.invoke(invocation);
        if invocation.mode() == IoMode::Write {
            self.forget_passphrases();
        }
        result
    }

    fn forget_passphrases(&self) {
        let Some(flush) = self
            .flavor
            .forget_passphrases(&self.config.binary, self.scratch.path())
        else {
            return;
        };
        match self.invoker.invoke(&flush) {
            Ok(result) if result.succeeded() => trace!("Flushed agent passphrase cache"),
            Ok(result) => debug!(exit_code = ?result.exit_code, "Agent cache flush failed"),
            Err(e) => debug!(error = %e, "Agent cache flush failed"),
        }
    }

    /// Write a payload to a scoped file inside the scratch home
    pub(crate) fn stage(&self, prefix: &str, data: &[u8]) -> Result<NamedTempFile> {
        let mut file = Builder::new().prefix(prefix).tempfile_in(self.home())?;
        file.write_all(data)?;
        file.flush()?;
        Ok(file)
    }

    /// Scratch keyring of the given kind, created on first use
    pub(crate) fn ensure_keyring(&mut self, kind: KeyringKind) -> Result<KeyringRef> {
        self.keyrings.ensure_keyring(kind, self.flavor.as_ref())
    }

    /// Load keys into the scratch keyring of the given kind
    pub fn import_keys(&mut self, keys: &[&[u8]], kind: KeyringKind) -> Result<ImportOutcome> {
        let base = self.invocation();
        self.keyrings.import_keys(
            self.invoker.as_ref(),
            self.flavor.as_ref(),
            &base,
            keys,
            kind,
        )
    }

    pub fn keyrings(&self) -> &KeyringManager {
        &self.keyrings
    }
}

/// Scratch homes hold key material; the engine also warns about homes others can read
#[cfg(unix)]
fn restrict_to_owner(home: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(home, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_home: &Path) -> Result<()> {
    Ok(())
}

/// Ask the engine for its version banner
fn detect_version(invoker: &dyn Invoker) -> Result<EngineVersion> {
    let result = invoker.invoke(&Invocation::bare().arg("--version").machine_readable())?;
    if !result.succeeded() {
        return Err(GpgError::process(format!(
            "Engine version query exited with {:?}",
            result.exit_code
        )));
    }
    let version = EngineVersion::parse_banner(&result.stdout_text())?;
    debug!(version = %version, "Detected engine version");
    Ok(version)
}

impl Drop for GpgEngine {
    fn drop(&mut self) {
        if let Some(teardown) = self.flavor.teardown(&self.config.binary, self.scratch.path()) {
            match self.invoker.invoke(&teardown) {
                Ok(result) if result.succeeded() => {
                    debug!(home = %self.scratch.path().display(), "Stopped scratch agent")
                }
                Ok(result) => warn!(exit_code = ?result.exit_code, "Scratch agent teardown failed"),
                Err(e) => warn!(error = %e, "Scratch agent teardown failed"),
            }
        }
    }
}

impl std::fmt::Debug for GpgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpgEngine")
            .field("version", &self.version)
            .field("flavor", &self.flavor)
            .field("home", &self.scratch.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::ScriptedInvoker;
    use std::fs;
    use tempfile::TempDir;

    fn scratch_entries(base: &Path) -> usize {
        fs::read_dir(base).unwrap().count()
    }

    #[test]
    fn test_modern_engine_uses_loopback() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 2.2.27\n");
        let engine = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker.clone()),
        )
        .unwrap();

        assert_eq!(engine.version(), EngineVersion::new(2, 2, 27));
        assert_eq!(engine.generation(), Generation::Loopback);
        assert!(engine.home().starts_with(base.path()));
        assert!(engine.home().join(flavor::AGENT_CONF).exists());

        let version_query = &invoker.invocations()[0];
        assert!(version_query.has_arg("--version"));
        assert!(version_query.is_machine_readable());
        assert!(!version_query.uses_baseline());
    }

    #[cfg(unix)]
    #[test]
    fn test_scratch_home_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let base = TempDir::new().unwrap();
        let engine = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(ScriptedInvoker::modern()),
        )
        .unwrap();

        let mode = fs::metadata(engine.home()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_legacy_engine() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 1.4.23\n");
        let engine = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker),
        )
        .unwrap();

        assert_eq!(engine.generation(), Generation::Legacy);
        assert!(!engine.home().join(flavor::AGENT_CONF).exists());
    }

    #[test]
    fn test_unsupported_version_creates_nothing() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 2.1.7\n");
        let err = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker),
        )
        .unwrap_err();

        assert!(matches!(err, GpgError::UnsupportedVersion(_)));
        assert_eq!(scratch_entries(base.path()), 0);
    }

    #[test]
    fn test_failed_version_query() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().fail(GpgError::process("no such binary"));
        let err = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker),
        )
        .unwrap_err();

        assert!(matches!(err, GpgError::Process(_)));
        assert_eq!(scratch_entries(base.path()), 0);
    }

    #[test]
    fn test_drop_removes_scratch_and_stops_agent() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 2.4.5\n");
        let engine = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker.clone()),
        )
        .unwrap();
        let home = engine.home().to_path_buf();
        assert!(home.exists());

        drop(engine);

        assert!(!home.exists());
        let teardown = invoker.tool_calls().pop().unwrap();
        assert!(teardown.has_arg("--kill"));
        assert_eq!(teardown.program_override(), Some(Path::new("gpgconf")));
    }

    #[test]
    fn test_passphrase_calls_flush_agent_cache() {
        let invoker = ScriptedInvoker::modern();
        let engine = invoker.engine();

        engine
            .run(&engine.invocation().arg("--list-packets"))
            .unwrap();
        assert!(invoker.tool_calls().is_empty());

        engine
            .run(&engine.invocation().input_line("secret").arg("--decrypt"))
            .unwrap();
        let flushes = invoker.tool_calls();
        assert_eq!(flushes.len(), 1);
        assert!(flushes[0].has_arg("--reload"));
        assert_eq!(flushes[0].program_override(), Some(Path::new("gpgconf")));
    }

    #[test]
    fn test_legacy_engine_has_no_cache_to_flush() {
        let invoker = ScriptedInvoker::legacy();
        let engine = invoker.engine();

        engine
            .run(&engine.invocation().input_line("secret").arg("--decrypt"))
            .unwrap();
        assert!(invoker.tool_calls().is_empty());
    }

    #[test]
    fn test_stage_writes_into_home() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 2.2.27\n");
        let engine = GpgEngine::with_invoker(
            EngineConfig::default().with_scratch_base(base.path()),
            Arc::new(invoker),
        )
        .unwrap();

        let staged = engine.stage("content-", b"payload").unwrap();
        assert!(staged.path().starts_with(engine.home()));
        assert_eq!(fs::read(staged.path()).unwrap(), b"payload");

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_invocation_carries_verbose_flag() {
        let base = TempDir::new().unwrap();
        let invoker = ScriptedInvoker::new().with_version("gpg (GnuPG) 2.2.27\n");
        let engine = GpgEngine::with_invoker(
            EngineConfig::default()
                .with_scratch_base(base.path())
                .with_verbose(true),
            Arc::new(invoker),
        )
        .unwrap();

        let invocation = engine.invocation();
        assert!(invocation.is_verbose());
        assert_eq!(invocation.home(), Some(engine.home()));
    }
}
