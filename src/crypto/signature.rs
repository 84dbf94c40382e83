//! Signing and signature verification.
//!
//! Verdicts come from two channels: the status tokens decide whether the
//! engine checked a signature at all, the diagnostic text carries the
//! human-readable verdict handed back to the caller.

use super::{produced_output, Passphrase};
use crate::engine::GpgEngine;
use crate::error::{GpgError, Result};
use crate::invoker::{status, StatusLog};
use crate::keyring::KeyringKind;
use crate::packet::{check_signature_verdict, key_id_from_fingerprint, DigestAlgorithm, SignatureVerdict};
use crate::validation::Validator;
use serde::Serialize;
use tracing::debug;

/// Tokens that carry a verdict on a checked signature
const VERDICT_TOKENS: [&str; 5] = [
    status::GOODSIG,
    status::EXPSIG,
    status::EXPKEYSIG,
    status::REVKEYSIG,
    status::BADSIG,
];

/// Shape of a produced signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SignatureMode {
    /// Signature stored apart from the content
    #[default]
    Detached,
    /// Content wrapped in a readable signed envelope
    Cleartext,
}

/// Parameters of a signing operation
#[derive(Debug, Clone)]
pub struct SignParams<'a> {
    pub public_key: Option<&'a [u8]>,
    pub private_key: Option<&'a [u8]>,
    pub passphrase: Option<Passphrase>,
    pub mode: SignatureMode,
    /// Digest algorithm name, e.g. `SHA256`; `None` uses the engine default
    pub digest: Option<String>,
    /// Character set of textual content
    pub charset: Option<String>,
    pub armor: bool,
}

impl<'a> SignParams<'a> {
    pub fn new<P: Into<Passphrase>>(public_key: &'a [u8], private_key: &'a [u8], passphrase: P) -> Self {
        Self {
            public_key: Some(public_key),
            private_key: Some(private_key),
            passphrase: Some(passphrase.into()),
            mode: SignatureMode::default(),
            digest: None,
            charset: None,
            armor: true,
        }
    }

    pub fn with_mode(mut self, mode: SignatureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_digest<S: Into<String>>(mut self, digest: S) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_charset<S: Into<String>>(mut self, charset: S) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }
}

/// A produced signature and the digest it was made with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedData {
    pub signature: Vec<u8>,
    /// `pgp-<digest>` for the `micalg` parameter of a signed MIME part
    pub micalg: Option<String>,
}

/// Parameters of a verification
#[derive(Debug, Clone, Default)]
pub struct VerifyParams<'a> {
    pub public_key: Option<&'a [u8]>,
    /// Detached signature, or the whole signed message when `content` is absent
    pub signature: Option<&'a [u8]>,
    /// Signed content of a detached signature
    pub content: Option<&'a [u8]>,
}

impl<'a> VerifyParams<'a> {
    pub fn detached(public_key: &'a [u8], signature: &'a [u8], content: &'a [u8]) -> Self {
        Self {
            public_key: Some(public_key),
            signature: Some(signature),
            content: Some(content),
        }
    }

    pub fn inline(public_key: &'a [u8], signed_message: &'a [u8]) -> Self {
        Self {
            public_key: Some(public_key),
            signature: Some(signed_message),
            content: None,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.content.is_some()
    }
}

impl GpgEngine {
    /// Sign content with the given key pair
    pub fn sign(&mut self, content: &[u8], params: &SignParams<'_>) -> Result<SignedData> {
        let content = Validator::require_bytes("content", Some(content))?;
        Validator::validate_message_size(content)?;
        let public_key = Validator::require_bytes("public_key", params.public_key)?;
        let private_key = Validator::require_bytes("private_key", params.private_key)?;
        let passphrase = Validator::require_passphrase("passphrase", params.passphrase.as_ref())?;
        Validator::validate_passphrase(passphrase)?;
        if let Some(digest) = &params.digest {
            if DigestAlgorithm::from_name(digest).is_none() {
                return Err(GpgError::invalid_input(format!(
                    "Unknown digest algorithm: {}",
                    digest
                )));
            }
        }
        if let Some(charset) = &params.charset {
            Validator::validate_identity_field("charset", charset)?;
        }

        let public = self.import_keys(&[public_key], KeyringKind::Public)?;
        let secret = self.import_keys(&[private_key], KeyringKind::Private)?;
        let signer = secret
            .primary_fingerprint()
            .or_else(|| public.primary_fingerprint())
            .ok_or_else(|| GpgError::engine("Signing key could not be imported"))?;

        let staged = self.stage("content-", content)?;
        let mut invocation = self
            .invocation()
            .args(public.keyring.args())
            .args(secret.keyring.args())
            .args(self.flavor().passphrase_args())
            .input_line(passphrase.expose())
            .arg("--local-user")
            .arg(signer);
        if let Some(digest) = &params.digest {
            invocation = invocation.arg("--digest-algo").arg(digest);
        }
        if let Some(charset) = &params.charset {
            invocation = invocation.arg("--charset").arg(charset);
        }
        invocation = match params.mode {
            SignatureMode::Detached if params.armor => invocation.args(["--armor", "--detach-sign"]),
            SignatureMode::Detached => invocation.arg("--detach-sign"),
            SignatureMode::Cleartext => invocation.arg("--clearsign"),
        };
        let invocation = invocation
            .arg(staged.path())
            .capture_output()
            .capture_stderr();

        let result = self.run(&invocation)?;
        if !result.status.has(status::SIG_CREATED) {
            return Err(GpgError::engine(format!(
                "Signing failed: {}",
                result.diagnostics()
            )));
        }
        let micalg = signature_micalg(&result.status);
        debug!(mode = ?params.mode, micalg = ?micalg, "Created signature");

        Ok(SignedData {
            signature: produced_output(result, "Signing")?,
            micalg,
        })
    }

    /// Check a detached or inline signature against the signer's public key
    pub fn verify(&mut self, params: &VerifyParams<'_>) -> Result<SignatureVerdict> {
        let public_key = Validator::require_bytes("public_key", params.public_key)?;
        let signature = Validator::require_bytes("signature", params.signature)?;
        if let Some(content) = params.content {
            Validator::validate_signature_size(signature)?;
            Validator::validate_message_size(content)?;
        } else {
            Validator::validate_message_size(signature)?;
        }

        let public = self.import_keys(&[public_key], KeyringKind::Public)?;
        let signature_file = self.stage("signature-", signature)?;
        let content_file = params
            .content
            .map(|content| self.stage("content-", content))
            .transpose()?;

        let invocation = self
            .invocation()
            .verbose(true)
            .machine_readable()
            .args(public.keyring.args())
            .arg("--verify")
            .arg(signature_file.path())
            .args(content_file.as_ref().map(|file| file.path()))
            .capture_stderr();
        let result = self.run(&invocation)?;

        check_signature_verdict(&result.stderr)?;
        if result.status.has(status::BADSIG) {
            return Err(GpgError::bad_signature(result.diagnostics()));
        }
        if result.status.has(status::ERRSIG) || result.status.has(status::NO_PUBKEY) {
            return Err(GpgError::engine(format!(
                "Signature could not be checked: {}",
                result.diagnostics()
            )));
        }
        let Some(verdict) = VERDICT_TOKENS
            .iter()
            .find_map(|token| result.status.find(token))
        else {
            return Err(GpgError::engine(format!(
                "Engine reported no signature verdict: {}",
                result.diagnostics()
            )));
        };

        let signer =
            attribute_signer(&result.status, Some(public.fingerprints.as_slice()))?;
        debug!(verdict = %verdict.keyword, signer = ?signer, "Verified signature");
        Ok(SignatureVerdict {
            message: None,
            diagnostics: result.stderr,
            signer,
        })
    }

    /// Check a signature-only message. Detached signatures are verified
    /// against their content; extracting the content of an inline signed
    /// message is not supported.
    pub fn decrypt_signature(&mut self, params: &VerifyParams<'_>) -> Result<SignatureVerdict> {
        if !params.is_detached() {
            return Err(GpgError::unimplemented(
                "Inline signed messages cannot be unwrapped; verify them instead",
            ));
        }
        self.verify(params)
    }
}

/// Key id of the primary key behind a checked signature.
///
/// `VALIDSIG` carries the primary key's fingerprint in its last field even
/// when a subkey made the signature. With `expected` set, the signature must
/// come from one of those keys; any other key in the scratch keyring is a
/// bad signature for this call.
pub(crate) fn attribute_signer(
    log: &StatusLog,
    expected: Option<&[String]>,
) -> Result<Option<String>> {
    let primary = log
        .find(status::VALIDSIG)
        .and_then(|line| line.arg(9).or_else(|| line.arg(0)));
    let Some(primary) = primary else {
        if expected.is_some() {
            return Err(GpgError::engine("Engine did not identify the signing key"));
        }
        return Ok(VERDICT_TOKENS
            .iter()
            .find_map(|token| log.find(token))
            .and_then(|line| line.arg(0))
            .and_then(key_id_from_fingerprint));
    };

    if let Some(expected) = expected {
        if !expected.iter().any(|fpr| fpr.eq_ignore_ascii_case(primary)) {
            return Err(GpgError::bad_signature(format!(
                "Signature was made by {} rather than the supplied key",
                primary
            )));
        }
    }
    Ok(key_id_from_fingerprint(primary))
}

/// Whether the engine checked a signature at all
pub(crate) fn has_signature_verdict(log: &StatusLog) -> bool {
    VERDICT_TOKENS.iter().any(|token| log.has(token))
}

/// `micalg` from the digest code in `SIG_CREATED`
fn signature_micalg(log: &StatusLog) -> Option<String> {
    log.find(status::SIG_CREATED)
        .and_then(|line| line.arg(2))
        .and_then(|code| code.parse::<u32>().ok())
        .and_then(DigestAlgorithm::from_code)
        .map(DigestAlgorithm::micalg)
}
