//! Key generation and key introspection.
//!
//! Generation runs the engine's unattended batch mode. Loopback engines keep
//! the new key in the scratch keyrings, so both halves are exported
//! afterwards; legacy engines write straight into keyring files named in the
//! batch script, which are read back directly.

use super::{unix_now, Passphrase};
use crate::engine::GpgEngine;
use crate::error::{GpgError, Result};
use crate::invoker::status;
use crate::keyring::KeyringKind;
use crate::packet::{backfill_key_ids, parse_fingerprints, parse_packets, FingerprintMap, KeyPacketInfo};
use crate::validation::Validator;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::Path;
use tempfile::Builder;
use tracing::{debug, info, warn};

pub const DEFAULT_KEY_TYPE: &str = "RSA";
pub const DEFAULT_KEY_LENGTH: u32 = 2048;

/// Algorithm preferences announced by every generated key
const PREFERENCES: &str =
    "SHA256 SHA384 SHA512 SHA224 AES256 AES192 AES CAST5 ZLIB BZIP2 ZIP Uncompressed";

/// Parameters of a key generation
#[derive(Clone)]
pub struct KeyGenParams {
    pub key_type: String,
    pub key_length: u32,
    /// Encryption subkey; `None` generates a primary key only
    pub subkey_type: Option<String>,
    pub subkey_length: u32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub comment: Option<String>,
    /// Absolute expiry, seconds since the epoch; `None` never expires
    pub expires_at: Option<u64>,
    /// Key creation time, seconds since the epoch; `None` uses the current time
    pub created_at: Option<u64>,
    /// `None` leaves the secret key unprotected
    pub passphrase: Option<Passphrase>,
    pub armor: bool,
}

impl Default for KeyGenParams {
    fn default() -> Self {
        Self {
            key_type: DEFAULT_KEY_TYPE.to_string(),
            key_length: DEFAULT_KEY_LENGTH,
            subkey_type: Some(DEFAULT_KEY_TYPE.to_string()),
            subkey_length: DEFAULT_KEY_LENGTH,
            name: None,
            email: None,
            comment: None,
            expires_at: None,
            created_at: None,
            passphrase: None,
            armor: true,
        }
    }
}

impl KeyGenParams {
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_passphrase<P: Into<Passphrase>>(mut self, passphrase: P) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_key(mut self, key_type: &str, length: u32) -> Self {
        self.key_type = key_type.to_string();
        self.key_length = length;
        self
    }

    pub fn with_subkey(mut self, key_type: &str, length: u32) -> Self {
        self.subkey_type = Some(key_type.to_string());
        self.subkey_length = length;
        self
    }

    pub fn without_subkey(mut self) -> Self {
        self.subkey_type = None;
        self
    }

    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_creation_time(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }

    fn validate(&self) -> Result<()> {
        let name = Validator::require_text("name", self.name.as_deref())?;
        let email = Validator::require_text("email", self.email.as_deref())?;
        Validator::validate_identity_field("name", name)?;
        Validator::validate_identity_field("email", email)?;
        if let Some(comment) = &self.comment {
            Validator::validate_identity_field("comment", comment)?;
        }
        Validator::validate_identity_field("key_type", &self.key_type)?;
        if let Some(subkey_type) = &self.subkey_type {
            Validator::validate_identity_field("subkey_type", subkey_type)?;
        }
        if let Some(passphrase) = &self.passphrase {
            Validator::validate_passphrase(passphrase)?;
        }
        Ok(())
    }

    /// Batch script lines, without keyring directives and `%commit`
    fn script(&self, now: u64, loopback: bool) -> Result<Vec<String>> {
        // Signatures come from the primary key so verifiers attribute them to it
        let mut lines = vec![
            format!("Key-Type: {}", self.key_type),
            format!("Key-Length: {}", self.key_length),
            "Key-Usage: sign".to_string(),
        ];
        if let Some(subkey_type) = &self.subkey_type {
            lines.push(format!("Subkey-Type: {}", subkey_type));
            lines.push(format!("Subkey-Length: {}", self.subkey_length));
            lines.push("Subkey-Usage: encrypt".to_string());
        }
        if let Some(name) = &self.name {
            lines.push(format!("Name-Real: {}", name));
        }
        if let Some(comment) = self.comment.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("Name-Comment: {}", comment));
        }
        if let Some(email) = &self.email {
            lines.push(format!("Name-Email: {}", email));
        }

        // The engine counts the expiry offset from the key's creation time
        let created = self.created_at.unwrap_or(now);
        match self.expires_at {
            Some(expires_at) if expires_at <= created => {
                return Err(GpgError::validation(format!(
                    "Expiry {} is not after key creation {}",
                    expires_at, created
                )));
            }
            Some(expires_at) => {
                lines.push(format!("Expire-Date: seconds={}", expires_at - created))
            }
            None => lines.push("Expire-Date: 0".to_string()),
        }
        if let Some(created_at) = self.created_at {
            lines.push(format!("Creation-Date: seconds={}", created_at));
        }

        match &self.passphrase {
            Some(passphrase) => lines.push(format!("Passphrase: {}", passphrase.expose())),
            None if loopback => lines.push("%no-protection".to_string()),
            None => {}
        }
        lines.push(format!("Preferences: {}", PREFERENCES));
        Ok(lines)
    }
}

impl fmt::Debug for KeyGenParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenParams")
            .field("key_type", &self.key_type)
            .field("key_length", &self.key_length)
            .field("subkey_type", &self.subkey_type)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .field("protected", &self.passphrase.is_some())
            .finish()
    }
}

/// Both halves of a freshly generated key pair
#[derive(Clone, Serialize)]
pub struct GeneratedKey {
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
    /// Fingerprint reported by the engine
    pub fingerprint: Option<String>,
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("public_key_size", &self.public_key.len())
            .field("private_key_size", &self.private_key.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Primary key id and all fingerprints found in a key blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyIdentity {
    pub key_id: Option<String>,
    pub fingerprints: Vec<String>,
}

impl GpgEngine {
    /// Generate a key pair through the engine's batch mode
    pub fn generate_key(&mut self, params: &KeyGenParams) -> Result<GeneratedKey> {
        params.validate()?;
        let loopback = !self.flavor().keygen_writes_keyrings();
        let mut script = params.script(unix_now(), loopback)?;

        let (public_key, private_key, fingerprint) = if loopback {
            self.generate_in_scratch(params, script)?
        } else {
            let out = Builder::new().prefix("keygen-").tempdir_in(self.home())?;
            let pubring = out.path().join(KeyringKind::Public.file_name());
            let secring = out.path().join(KeyringKind::Private.file_name());
            script.push(format!("%pubring {}", pubring.display()));
            script.push(format!("%secring {}", secring.display()));
            let fingerprint = self.run_keygen(script, &[])?;

            if params.armor {
                let public_args = self.flavor().keyring_args(KeyringKind::Public, &pubring);
                let mut secret_args = public_args.clone();
                secret_args.extend(self.flavor().keyring_args(KeyringKind::Private, &secring));
                (
                    self.export_key(&public_args, None, false, None, true)?,
                    self.export_key(&secret_args, None, true, params.passphrase.as_ref(), true)?,
                    fingerprint,
                )
            } else {
                (read_keyring(&pubring)?, read_keyring(&secring)?, fingerprint)
            }
        };

        if public_key.is_empty() {
            return Err(GpgError::key_generation("Generated public key is empty"));
        }
        if private_key.is_empty() {
            return Err(GpgError::key_generation("Generated private key is empty"));
        }

        info!(
            fingerprint = fingerprint.as_deref().unwrap_or("unknown"),
            key_type = %params.key_type,
            key_length = params.key_length,
            "Generated key pair"
        );

        Ok(GeneratedKey {
            public_key,
            private_key,
            fingerprint,
        })
    }

    fn generate_in_scratch(
        &mut self,
        params: &KeyGenParams,
        script: Vec<String>,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<String>)> {
        let keyring = self.ensure_keyring(KeyringKind::Public)?;
        let fingerprint = self.run_keygen(script, keyring.args())?.ok_or_else(|| {
            GpgError::key_generation("Engine did not report the created key")
        })?;

        let public_key = self.export_key(keyring.args(), Some(&fingerprint), false, None, params.armor)?;
        let private_key = self.export_key(
            keyring.args(),
            Some(&fingerprint),
            true,
            params.passphrase.as_ref(),
            params.armor,
        )?;
        Ok((public_key, private_key, Some(fingerprint)))
    }

    /// Run the batch script; returns the fingerprint from `KEY_CREATED`
    fn run_keygen(&self, mut script: Vec<String>, keyring_args: &[OsString]) -> Result<Option<String>> {
        script.push("%commit".to_string());
        let invocation = script
            .into_iter()
            .fold(self.invocation(), |invocation, line| invocation.input_line(line))
            .machine_readable()
            .args(keyring_args)
            .arg("--gen-key")
            .capture_stderr();
        let result = self.run(&invocation)?;

        let fingerprint = result
            .status
            .find(status::KEY_CREATED)
            .and_then(|line| line.arg(1))
            .map(str::to_string);
        if fingerprint.is_none() && !result.succeeded() {
            return Err(GpgError::key_generation(format!(
                "Engine exited with {:?}: {}",
                result.exit_code,
                result.diagnostics()
            )));
        }
        debug!(fingerprint = ?fingerprint, "Key generation finished");
        Ok(fingerprint)
    }

    /// Export public or secret keys from the given keyrings; empty when nothing matched
    fn export_key(
        &self,
        keyring_args: &[OsString],
        selector: Option<&str>,
        secret: bool,
        passphrase: Option<&Passphrase>,
        armor: bool,
    ) -> Result<Vec<u8>> {
        let mut invocation = self.invocation().args(keyring_args);
        if secret {
            invocation = invocation
                .args(self.flavor().passphrase_args())
                .input_line(passphrase.map(Passphrase::expose).unwrap_or_default());
        }
        if armor {
            invocation = invocation.arg("--armor");
        }
        invocation = invocation
            .arg(if secret { "--export-secret-keys" } else { "--export" })
            .args(selector)
            .capture_output()
            .capture_stderr();

        let result = self.run(&invocation)?;
        Ok(result.output.unwrap_or_default())
    }

    /// Public key of a private key blob
    pub fn public_from_private(&mut self, private_key: &[u8], armor: bool) -> Result<Vec<u8>> {
        let private_key = Validator::require_bytes("private_key", Some(private_key))?;
        let outcome = self.import_keys(&[private_key], KeyringKind::Private)?;
        let fingerprint = outcome
            .primary_fingerprint()
            .map(str::to_string)
            .ok_or_else(|| GpgError::engine("Engine did not accept the private key"))?;

        let public = self.ensure_keyring(KeyringKind::Public)?;
        let public_key = self.export_key(public.args(), Some(&fingerprint), false, None, armor)?;
        if public_key.is_empty() {
            return Err(GpgError::engine(format!(
                "No public key exported for {}",
                fingerprint
            )));
        }
        Ok(public_key)
    }

    /// Key ids and fingerprints of every primary key in a blob; empty when none was recognized
    pub fn fingerprints(&mut self, blob: &[u8]) -> Result<FingerprintMap> {
        let blob = Validator::require_bytes("key", Some(blob))?;
        Validator::validate_key_size(blob)?;
        let keyring = self.ensure_keyring(KeyringKind::Public)?;
        let staged = self.stage("listing-", blob)?;

        let invocation = self
            .invocation()
            .machine_readable()
            .args(keyring.args())
            .args(self.flavor().fingerprint_listing_args(staged.path()));
        let result = self.run(&invocation)?;

        let map = parse_fingerprints(&result.stdout_text());
        debug!(keys = map.len(), "Listed fingerprints");
        Ok(map)
    }

    /// Primary keys currently held by a scratch keyring, one entry per key
    pub fn keyring_fingerprints(&mut self, kind: KeyringKind) -> Result<FingerprintMap> {
        let mut keyring_args = self.ensure_keyring(KeyringKind::Public)?.args().to_vec();
        let listing = match kind {
            KeyringKind::Public => "--list-keys",
            KeyringKind::Private => {
                let private = self.ensure_keyring(KeyringKind::Private)?;
                keyring_args.extend(private.args().iter().cloned());
                "--list-secret-keys"
            }
        };

        let invocation = self
            .invocation()
            .machine_readable()
            .args(&keyring_args)
            .args(["--with-colons", "--with-fingerprint", listing]);
        let result = self.run(&invocation)?;

        let map = parse_fingerprints(&result.stdout_text());
        debug!(kind = %kind, keys = map.len(), "Listed keyring");
        Ok(map)
    }

    /// `{key_id, fingerprints}` of a key blob
    pub fn key_identity(&mut self, blob: &[u8]) -> Result<KeyIdentity> {
        let map = self.fingerprints(blob)?;
        Ok(KeyIdentity {
            key_id: map.first_key_id().map(str::to_string),
            fingerprints: map.fingerprints(),
        })
    }

    /// Packet records of a key, signature or message blob
    pub fn packets(&mut self, blob: &[u8]) -> Result<Vec<KeyPacketInfo>> {
        let blob = Validator::require_bytes("data", Some(blob))?;
        Validator::validate_message_size(blob)?;
        let staged = self.stage("packets-", blob)?;

        let invocation = self
            .invocation()
            .machine_readable()
            .arg("--list-packets")
            .arg(staged.path());
        let result = self.run(&invocation)?;
        let mut records = parse_packets(&result.stdout_text());

        let missing = records
            .iter()
            .any(|record| record.key().is_some() && record.key_id().is_none());
        if missing {
            match self.fingerprints(blob) {
                Ok(listing) if !listing.is_empty() => backfill_key_ids(&mut records, &listing),
                Ok(_) => warn!("Packet dump lacks key ids and the listing found no keys"),
                Err(e) => warn!(error = %e, "Failed to backfill key ids"),
            }
        }

        Ok(records)
    }
}

fn read_keyring(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::{with_output, with_status, with_stdout, ScriptedInvoker};

    const FPR: &str = "0123456789ABCDEF0123456789ABCDEF12345678";

    fn input(invocation: &crate::invoker::Invocation) -> Vec<String> {
        invocation.input_lines().map(str::to_string).collect()
    }

    #[test]
    fn test_generate_key_loopback_exports_both_halves() {
        let created = format!("KEY_CREATED B {}", FPR);
        let invoker = ScriptedInvoker::modern()
            .respond(with_status(&[created.as_str()]))
            .respond(with_output(b"PUBLIC BLOCK", &[]))
            .respond(with_output(b"PRIVATE BLOCK", &[]));
        let mut engine = invoker.engine();

        let params = KeyGenParams::new("Alice Example", "alice@example.com")
            .with_comment("work")
            .with_passphrase("p@ss");
        let key = engine.generate_key(&params).unwrap();

        assert_eq!(key.public_key, b"PUBLIC BLOCK");
        assert_eq!(key.private_key, b"PRIVATE BLOCK");
        assert_eq!(key.fingerprint.as_deref(), Some(FPR));

        let calls = invoker.operations();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].has_arg("--gen-key"));
        assert!(calls[0].is_machine_readable());
        let script = input(&calls[0]);
        assert_eq!(script[0], "Key-Type: RSA");
        assert!(script.contains(&"Name-Email: alice@example.com".to_string()));
        assert!(script.contains(&"Name-Comment: work".to_string()));
        assert!(script.contains(&"Passphrase: p@ss".to_string()));
        assert!(script.contains(&"Expire-Date: 0".to_string()));
        assert!(script.contains(&"Key-Usage: sign".to_string()));
        assert!(script.contains(&"Subkey-Usage: encrypt".to_string()));
        assert!(!script.iter().any(|line| line.starts_with("%pubring")));
        assert_eq!(script.last().map(String::as_str), Some("%commit"));

        assert!(calls[1].has_arg("--export"));
        assert!(calls[1].has_arg(FPR));
        assert!(calls[1].has_arg("--armor"));
        assert!(calls[2].has_arg("--export-secret-keys"));
        assert!(calls[2].has_arg("loopback"));
        assert_eq!(input(&calls[2]), vec!["p@ss"]);
    }

    #[test]
    fn test_generate_key_without_passphrase_is_unprotected() {
        let created = format!("KEY_CREATED P {}", FPR);
        let invoker = ScriptedInvoker::modern()
            .respond(with_status(&[created.as_str()]))
            .respond(with_output(b"PUB", &[]))
            .respond(with_output(b"SEC", &[]));
        let mut engine = invoker.engine();

        let params = KeyGenParams::new("Bob", "bob@example.org")
            .without_subkey()
            .with_creation_time(1_600_000_000);
        engine.generate_key(&params).unwrap();

        let script = input(&invoker.operations()[0]);
        assert!(script.contains(&"%no-protection".to_string()));
        assert!(script.contains(&"Creation-Date: seconds=1600000000".to_string()));
        assert!(!script.iter().any(|line| line.starts_with("Subkey-Type")));
    }

    #[test]
    fn test_expiry_counts_from_creation_time() {
        let day = 24 * 60 * 60;
        let now = 1_700_000_000;
        let params = KeyGenParams::new("Frank", "frank@example.com")
            .with_creation_time(now - 30 * day)
            .with_expiry(now + 10 * day);

        let script = params.script(now, true).unwrap();
        let offset = format!("Expire-Date: seconds={}", 40 * day);
        assert!(script.contains(&offset), "{:?}", script);

        let fresh = KeyGenParams::new("Frank", "frank@example.com").with_expiry(now + day);
        let script = fresh.script(now, true).unwrap();
        assert!(script.contains(&format!("Expire-Date: seconds={}", day)));
    }

    #[test]
    fn test_expiry_before_creation_is_rejected() {
        let created = 1_600_000_000;
        for expires_at in [created - 1, created] {
            let params = KeyGenParams::new("Grace", "grace@example.com")
                .with_creation_time(created)
                .with_expiry(expires_at);
            assert!(matches!(
                params.script(1_700_000_000, true),
                Err(GpgError::Validation(_))
            ));
        }

        // A key created in the past may already be expired by now
        let lapsed = KeyGenParams::new("Grace", "grace@example.com")
            .with_creation_time(created)
            .with_expiry(created + 60);
        assert!(lapsed.script(1_700_000_000, true).is_ok());
    }

    #[test]
    fn test_generate_key_empty_export_fails() {
        let created = format!("KEY_CREATED B {}", FPR);
        let invoker = ScriptedInvoker::modern()
            .respond(with_status(&[created.as_str()]))
            .respond(with_output(b"PUB", &[]))
            .respond(with_output(b"", &[]));
        let mut engine = invoker.engine();

        let err = engine
            .generate_key(&KeyGenParams::new("Carol", "carol@example.net"))
            .unwrap_err();
        assert!(matches!(err, GpgError::KeyGeneration(_)));
    }

    #[test]
    fn test_generate_key_legacy_names_keyring_files() {
        let invoker = ScriptedInvoker::legacy().respond(with_status(&[]));
        let mut engine = invoker.engine();

        let err = engine
            .generate_key(&KeyGenParams::new("Dave", "dave@example.com").with_armor(false))
            .unwrap_err();
        // The scripted engine writes nothing, so both keyring files stay empty
        assert!(matches!(err, GpgError::KeyGeneration(_)));

        let script = input(&invoker.operations()[0]);
        assert!(script.iter().any(|line| line.starts_with("%pubring ")));
        assert!(script.iter().any(|line| line.starts_with("%secring ")));
        assert!(!script.contains(&"%no-protection".to_string()));
    }

    #[test]
    fn test_generate_key_missing_parameters() {
        let invoker = ScriptedInvoker::modern();
        let mut engine = invoker.engine();

        let params = KeyGenParams {
            name: Some("Eve".to_string()),
            ..Default::default()
        };
        match engine.generate_key(&params) {
            Err(GpgError::MissingParameter(name)) => assert_eq!(name, "email"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(invoker.operations().is_empty());
    }

    #[test]
    fn test_generate_key_rejects_script_injection() {
        let invoker = ScriptedInvoker::modern();
        let mut engine = invoker.engine();

        let params = KeyGenParams::new("Mallory\n%commit", "m@example.com");
        assert!(matches!(
            engine.generate_key(&params),
            Err(GpgError::Validation(_))
        ));

        let past = KeyGenParams::new("Old", "old@example.com").with_expiry(1);
        assert!(matches!(
            engine.generate_key(&past),
            Err(GpgError::Validation(_))
        ));
        assert!(invoker.operations().is_empty());
    }

    #[test]
    fn test_public_from_private() {
        let secret_ok = format!("IMPORT_OK 17 {}", FPR);
        let public_ok = format!("IMPORT_OK 0 {}", FPR);
        let invoker = ScriptedInvoker::modern()
            .respond(with_status(&[secret_ok.as_str()]))
            .respond(with_status(&[public_ok.as_str()]))
            .respond(with_output(b"PUBLIC ONLY", &[]));
        let mut engine = invoker.engine();

        let public = engine.public_from_private(b"secret key blob", true).unwrap();
        assert_eq!(public, b"PUBLIC ONLY");

        let export = invoker.last();
        assert!(export.has_arg("--export"));
        assert!(export.has_arg(FPR));
        assert!(export.wants_output());
    }

    #[test]
    fn test_public_from_private_requires_key() {
        let invoker = ScriptedInvoker::modern();
        let mut engine = invoker.engine();
        assert!(matches!(
            engine.public_from_private(b"", true),
            Err(GpgError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_key_identity() {
        let listing = format!(
            "pub:-:2048:1:89ABCDEF12345678:1577836800:::-:\nfpr:::::::::{}:\n",
            FPR
        );
        let invoker = ScriptedInvoker::modern().respond(with_stdout(&listing));
        let mut engine = invoker.engine();

        let identity = engine.key_identity(b"public key blob").unwrap();
        assert_eq!(identity.key_id.as_deref(), Some("0x89ABCDEF12345678"));
        assert_eq!(identity.fingerprints, vec![FPR.to_string()]);

        let call = invoker.last();
        assert!(call.has_arg("show-only"));
        assert!(call.is_machine_readable());
    }

    #[test]
    fn test_keyring_fingerprints() {
        let listing = format!(
            "tru::1:1600000000:0:3:1:5\npub:u:2048:1:89ABCDEF12345678:1577836800:::u:::scESC:\nfpr:::::::::{}:\nsub:u:2048:1:1111222233334444:1577836800::::::e:\nfpr:::::::::1111222233334444111122223333444411112222:\n",
            FPR
        );
        let invoker = ScriptedInvoker::modern().respond(with_stdout(&listing));
        let mut engine = invoker.engine();

        let map = engine.keyring_fingerprints(KeyringKind::Public).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("0x89ABCDEF12345678"), Some(FPR));

        let call = invoker.last();
        assert!(call.has_arg("--list-keys"));
        assert!(call.has_arg("--keyring"));
        assert!(call.is_machine_readable());
    }

    #[test]
    fn test_keyring_fingerprints_lists_secret_keys() {
        let invoker = ScriptedInvoker::legacy().respond(with_stdout(""));
        let mut engine = invoker.engine();

        assert!(engine.keyring_fingerprints(KeyringKind::Private).unwrap().is_empty());
        let call = invoker.last();
        assert!(call.has_arg("--list-secret-keys"));
        assert!(call.has_arg("--secret-keyring"));
    }

    #[test]
    fn test_key_identity_of_garbage_is_empty() {
        let invoker = ScriptedInvoker::modern().respond(with_stdout(""));
        let mut engine = invoker.engine();
        let identity = engine.key_identity(b"not a key").unwrap();
        assert_eq!(identity, KeyIdentity::default());
    }

    #[test]
    fn test_packets_backfills_missing_key_ids() {
        let dump = ":public key packet:\n\tversion 4, algo 1, created 1577836800, expires 0\n\tpkey[0]: [2048 bits]\n:user id packet: \"Alice <alice@example.com>\"\n";
        let listing = format!(
            "pub:-:2048:1:89ABCDEF12345678:1577836800:::-:\nfpr:::::::::{}:\n",
            FPR
        );
        let invoker = ScriptedInvoker::modern()
            .respond(with_stdout(dump))
            .respond(with_stdout(&listing));
        let mut engine = invoker.engine();

        let records = engine.packets(b"key blob").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key_id(), Some("0x89ABCDEF12345678"));
        assert_eq!(
            records[0].user_id(1).unwrap().email.as_deref(),
            Some("alice@example.com")
        );

        let calls = invoker.operations();
        assert!(calls[0].has_arg("--list-packets"));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn test_packets_with_key_ids_skip_listing() {
        let dump = ":public key packet:\n\tversion 4, algo 1, created 1577836800, expires 0\n\tkeyid: 89ABCDEF12345678\n";
        let invoker = ScriptedInvoker::modern().respond(with_stdout(dump));
        let mut engine = invoker.engine();

        let records = engine.packets(b"key blob").unwrap();
        assert_eq!(records[0].key_id(), Some("0x89ABCDEF12345678"));
        assert_eq!(invoker.operations().len(), 1);
    }
}
