//! Encryption and decryption.

use super::signature::{attribute_signer, has_signature_verdict};
use super::{produced_output, Passphrase};
use crate::engine::GpgEngine;
use crate::error::{GpgError, Result};
use crate::invoker::{status, InvocationResult};
use crate::keyring::KeyringKind;
use crate::packet::verdict::{check_signature_verdict, reports_symmetric_encryption};
use crate::packet::SignatureVerdict;
use crate::validation::Validator;
use tracing::{debug, warn};

/// Key and passphrase used to sign while encrypting
#[derive(Debug, Clone, Copy)]
pub struct Signer<'a> {
    pub public_key: &'a [u8],
    pub private_key: &'a [u8],
    pub passphrase: &'a Passphrase,
}

/// Parameters of an asymmetric encryption
#[derive(Debug, Clone)]
pub struct EncryptParams<'a> {
    pub recipient_keys: Vec<&'a [u8]>,
    /// Sign and encrypt in one pass
    pub signer: Option<Signer<'a>>,
    /// Cipher names to try in order; empty uses the engine default
    pub ciphers: Vec<String>,
    pub armor: bool,
}

impl<'a> EncryptParams<'a> {
    pub fn new(recipient_keys: Vec<&'a [u8]>) -> Self {
        Self {
            recipient_keys,
            signer: None,
            ciphers: Vec::new(),
            armor: true,
        }
    }

    pub fn with_signer(mut self, signer: Signer<'a>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_ciphers<I, S>(mut self, ciphers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ciphers = ciphers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }
}

/// Parameters of a passphrase-only encryption
#[derive(Debug, Clone)]
pub struct SymmetricEncryptParams {
    pub passphrase: Option<Passphrase>,
    pub cipher: Option<String>,
    pub armor: bool,
}

impl SymmetricEncryptParams {
    pub fn new<P: Into<Passphrase>>(passphrase: P) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
            cipher: None,
            armor: true,
        }
    }

    pub fn with_cipher<S: Into<String>>(mut self, cipher: S) -> Self {
        self.cipher = Some(cipher.into());
        self
    }

    pub fn with_armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }
}

/// Parameters of a decryption
#[derive(Debug, Clone, Default)]
pub struct DecryptParams<'a> {
    pub private_key: Option<&'a [u8]>,
    /// Sender key, needed to check a signature embedded in the message
    pub public_key: Option<&'a [u8]>,
    pub passphrase: Option<Passphrase>,
    /// The secret needs no passphrase; nothing is written to the engine's input
    pub no_passphrase: bool,
}

impl<'a> DecryptParams<'a> {
    pub fn new<P: Into<Passphrase>>(private_key: &'a [u8], passphrase: P) -> Self {
        Self {
            private_key: Some(private_key),
            passphrase: Some(passphrase.into()),
            ..Default::default()
        }
    }

    /// Decrypt a passphrase-only message
    pub fn symmetric<P: Into<Passphrase>>(passphrase: P) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
            ..Default::default()
        }
    }

    pub fn with_public_key(mut self, public_key: &'a [u8]) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn without_passphrase(mut self) -> Self {
        self.no_passphrase = true;
        self.passphrase = None;
        self
    }
}

impl GpgEngine {
    /// Encrypt to every recipient key, trusting them all
    pub fn encrypt(&mut self, plaintext: &[u8], params: &EncryptParams<'_>) -> Result<Vec<u8>> {
        let plaintext = Validator::require_bytes("plaintext", Some(plaintext))?;
        Validator::validate_message_size(plaintext)?;
        if params.recipient_keys.is_empty() {
            return Err(GpgError::missing_parameter("recipient_keys"));
        }
        Validator::validate_recipient_count(params.recipient_keys.len())?;
        if let Some(signer) = &params.signer {
            Validator::require_bytes("signer.public_key", Some(signer.public_key))?;
            Validator::require_bytes("signer.private_key", Some(signer.private_key))?;
            Validator::validate_passphrase(signer.passphrase)?;
        }

        let imported = self.import_keys(&params.recipient_keys, KeyringKind::Public)?;
        if imported.fingerprints.is_empty() {
            return Err(GpgError::engine("No recipient key could be imported"));
        }
        if imported.fingerprints.len() < params.recipient_keys.len() {
            warn!(
                supplied = params.recipient_keys.len(),
                imported = imported.fingerprints.len(),
                "Some recipient keys were not imported"
            );
        }

        let mut invocation = self
            .invocation()
            .args(imported.keyring.args())
            .args(["--trust-model", "always"]);
        for fingerprint in &imported.fingerprints {
            invocation = invocation.arg("--recipient").arg(fingerprint);
        }

        if let Some(signer) = &params.signer {
            self.import_keys(&[signer.public_key], KeyringKind::Public)?;
            let secret = self.import_keys(&[signer.private_key], KeyringKind::Private)?;
            let signer_fpr = secret
                .primary_fingerprint()
                .ok_or_else(|| GpgError::engine("Signer key could not be imported"))?;
            invocation = invocation
                .args(secret.keyring.args())
                .args(self.flavor().passphrase_args())
                .input_line(signer.passphrase.expose())
                .arg("--sign")
                .arg("--local-user")
                .arg(signer_fpr);
        }
        if params.armor {
            invocation = invocation.arg("--armor");
        }

        let staged = self.stage("plain-", plaintext)?;
        let candidates: Vec<Option<&str>> = if params.ciphers.is_empty() {
            vec![None]
        } else {
            params.ciphers.iter().map(|c| Some(c.as_str())).collect()
        };

        let mut last_diagnostics = String::new();
        for cipher in candidates {
            let attempt = invocation
                .clone()
                .args(cipher.map(|c| ["--cipher-algo", c]).into_iter().flatten())
                .arg("--encrypt")
                .arg(staged.path())
                .capture_output()
                .capture_stderr();
            let result = self.run(&attempt)?;

            if result.status.has(status::END_ENCRYPTION) && !result.output_bytes().is_empty() {
                debug!(
                    recipients = imported.fingerprints.len(),
                    cipher = cipher.unwrap_or("default"),
                    signed = params.signer.is_some(),
                    "Encrypted message"
                );
                return produced_output(result, "Encryption");
            }

            warn!(
                cipher = cipher.unwrap_or("default"),
                exit_code = ?result.exit_code,
                "Encryption attempt failed"
            );
            last_diagnostics = result.diagnostics().to_string();
        }

        Err(GpgError::engine(format!(
            "Encryption failed: {}",
            last_diagnostics
        )))
    }

    /// Encrypt with a passphrase only, integrity protection forced
    pub fn encrypt_symmetric(
        &mut self,
        plaintext: &[u8],
        params: &SymmetricEncryptParams,
    ) -> Result<Vec<u8>> {
        let plaintext = Validator::require_bytes("plaintext", Some(plaintext))?;
        Validator::validate_message_size(plaintext)?;
        let passphrase = Validator::require_passphrase("passphrase", params.passphrase.as_ref())?;
        Validator::validate_passphrase(passphrase)?;

        let staged = self.stage("plain-", plaintext)?;
        let mut invocation = self
            .invocation()
            .args(self.flavor().passphrase_args())
            .input_line(passphrase.expose())
            .args(["--symmetric", "--force-mdc"]);
        if let Some(cipher) = &params.cipher {
            invocation = invocation.arg("--cipher-algo").arg(cipher);
        }
        if params.armor {
            invocation = invocation.arg("--armor");
        }
        let invocation = invocation
            .arg(staged.path())
            .capture_output()
            .capture_stderr();

        let result = self.run(&invocation)?;
        if !result.status.has(status::END_ENCRYPTION) {
            return Err(GpgError::engine(format!(
                "Symmetric encryption failed: {}",
                result.diagnostics()
            )));
        }
        produced_output(result, "Symmetric encryption")
    }

    /// Decrypt a message; success is decided by the `DECRYPTION_OKAY` status token
    pub fn decrypt(&mut self, ciphertext: &[u8], params: &DecryptParams<'_>) -> Result<Vec<u8>> {
        let (result, _) = self.run_decrypt(ciphertext, params, false)?;
        Ok(result.output.unwrap_or_default())
    }

    /// Decrypt a message and check the signature it carries
    pub fn decrypt_verify(
        &mut self,
        ciphertext: &[u8],
        params: &DecryptParams<'_>,
    ) -> Result<SignatureVerdict> {
        let (result, sender) = self.run_decrypt(ciphertext, params, true)?;

        check_signature_verdict(&result.stderr)?;
        if result.status.has(status::BADSIG) {
            return Err(GpgError::bad_signature(result.diagnostics()));
        }
        if result.status.has(status::ERRSIG) {
            return Err(GpgError::engine(format!(
                "Embedded signature could not be checked: {}",
                result.diagnostics()
            )));
        }

        let signer = if has_signature_verdict(&result.status) {
            attribute_signer(&result.status, sender.as_deref())?
        } else {
            None
        };
        Ok(SignatureVerdict {
            diagnostics: result.stderr,
            message: Some(result.output.unwrap_or_default()),
            signer,
        })
    }

    fn run_decrypt(
        &mut self,
        ciphertext: &[u8],
        params: &DecryptParams<'_>,
        verify: bool,
    ) -> Result<(InvocationResult, Option<Vec<String>>)> {
        let ciphertext = Validator::require_bytes("ciphertext", Some(ciphertext))?;
        Validator::validate_message_size(ciphertext)?;
        let passphrase = if params.no_passphrase {
            None
        } else {
            let passphrase =
                Validator::require_passphrase("passphrase", params.passphrase.as_ref())?;
            Validator::validate_passphrase(passphrase)?;
            Some(passphrase)
        };

        let mut keyring_args = self.ensure_keyring(KeyringKind::Public)?.args().to_vec();
        let sender = params
            .public_key
            .map(|public_key| self.import_keys(&[public_key], KeyringKind::Public))
            .transpose()?
            .map(|outcome| outcome.fingerprints);
        if let Some(private_key) = params.private_key {
            let secret = self.import_keys(&[private_key], KeyringKind::Private)?;
            keyring_args.extend(secret.keyring.args().iter().cloned());
        }

        let staged = self.stage("cipher-", ciphertext)?;
        let mut invocation = self.invocation().args(&keyring_args);
        if let Some(passphrase) = passphrase {
            invocation = invocation
                .args(self.flavor().passphrase_args())
                .input_line(passphrase.expose());
        }
        if verify {
            invocation = invocation.verbose(true).machine_readable();
        }
        let invocation = invocation
            .arg("--decrypt")
            .arg(staged.path())
            .capture_output()
            .capture_stderr();

        let result = self.run(&invocation)?;
        if !result.status.has(status::DECRYPTION_OKAY) {
            return Err(GpgError::decryption_failed(
                Some(result.diagnostics())
                    .filter(|d| !d.is_empty())
                    .unwrap_or("engine did not report success"),
            ));
        }
        debug!(size = result.output_bytes().len(), "Decrypted message");
        Ok((result, sender))
    }

    /// Whether a message is encrypted with a passphrase only.
    ///
    /// Tries an empty passphrase and reads the diagnostics; the
    /// decryption itself is expected to fail and is not reported.
    pub fn is_encrypted_symmetrically(&mut self, ciphertext: &[u8]) -> Result<bool> {
        let ciphertext = Validator::require_bytes("ciphertext", Some(ciphertext))?;
        Validator::validate_message_size(ciphertext)?;
        let keyring = self.ensure_keyring(KeyringKind::Public)?;
        let staged = self.stage("detect-", ciphertext)?;

        let invocation = self
            .invocation()
            .verbose(true)
            .machine_readable()
            .args(keyring.args())
            .args(self.flavor().passphrase_args())
            .input_line(Passphrase::empty().expose())
            .arg("--decrypt")
            .arg(staged.path())
            .capture_output()
            .capture_stderr();
        let result = self.run(&invocation)?;

        Ok(reports_symmetric_encryption(&result.stderr)
            || result.status.has(status::NEED_PASSPHRASE_SYM))
    }
}
