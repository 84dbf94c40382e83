//! Adversarial input tests for gpgbridge
//!
//! Hostile or malformed parameters must be rejected before the engine is
//! ever spawned, and hostile engine output must be contained. These tests
//! drive a handle through a recording invoker, so no engine is required.

use gpgbridge::invoker::{Invocation, InvocationResult, Invoker, StatusLog};
use gpgbridge::validation::{MAX_KEY_SIZE, MAX_MESSAGE_SIZE, MAX_RECIPIENTS, MAX_USER_ID_LENGTH};
use gpgbridge::{
    DecryptParams, EncryptParams, EngineConfig, GpgEngine, GpgError, KeyGenParams, KeyringKind,
    SignParams, SymmetricEncryptParams, VerifyParams,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Answers the version query, then replays queued results
#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<Invocation>>,
    queued: Mutex<VecDeque<InvocationResult>>,
}

impl RecordingInvoker {
    fn queue(&self, result: InvocationResult) {
        self.queued.lock().unwrap().push_back(result);
    }

    /// Engine calls other than the version query and agent teardown
    fn operations(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| !call.has_arg("--version") && call.program_override().is_none())
            .count()
    }
}

impl Invoker for RecordingInvoker {
    fn invoke(&self, invocation: &Invocation) -> gpgbridge::Result<InvocationResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        if invocation.has_arg("--version") {
            return Ok(InvocationResult {
                stdout: b"gpg (GnuPG) 2.2.40\n".to_vec(),
                exit_code: Some(0),
                ..Default::default()
            });
        }
        Ok(self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InvocationResult {
                exit_code: Some(0),
                ..Default::default()
            }))
    }
}

fn engine(base: &TempDir) -> (GpgEngine, Arc<RecordingInvoker>) {
    let invoker = Arc::new(RecordingInvoker::default());
    let engine = GpgEngine::with_invoker(
        EngineConfig::default().with_scratch_base(base.path()),
        invoker.clone(),
    )
    .expect("Failed to start engine");
    (engine, invoker)
}

/// Test that identity fields cannot inject key generation script directives
#[test]
fn test_keygen_script_injection() {
    let base = TempDir::new().unwrap();
    let (mut engine, invoker) = engine(&base);

    let hostile = [
        KeyGenParams::new("Mallory\n%commit", "mallory@example.org"),
        KeyGenParams::new("Mallory", "mallory@example.org\nPassphrase: x"),
        KeyGenParams::new("Mallory", "mallory@example.org").with_comment("a\r\nKey-Length: 512"),
        KeyGenParams::new("Mallory", "mallory@example.org").with_passphrase("pw\n%no-protection"),
        KeyGenParams::new("Mallory", "mallory@example.org").with_key("RSA\nSubkey-Type: DSA", 2048),
    ];
    for params in &hostile {
        let err = engine.generate_key(params).unwrap_err();
        assert!(matches!(err, GpgError::Validation(_)), "{:?}", err);
    }

    let oversized = "A".repeat(MAX_USER_ID_LENGTH + 1);
    let err = engine
        .generate_key(&KeyGenParams::new(oversized, "mallory@example.org"))
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    assert_eq!(invoker.operations(), 0, "Engine spawned for rejected input");
}

/// Test that passphrases cannot carry extra input lines
#[test]
fn test_passphrase_line_injection() {
    let base = TempDir::new().unwrap();
    let (mut engine, invoker) = engine(&base);

    let err = engine
        .encrypt_symmetric(b"data", &SymmetricEncryptParams::new("pw\nsecond line"))
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    let err = engine
        .decrypt(b"ciphertext", &DecryptParams::symmetric("pw\r"))
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    let err = engine
        .sign(b"content", &SignParams::new(b"pub", b"sec", "a\nb"))
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    assert_eq!(invoker.operations(), 0);
}

/// Test that missing parameters fail fast without touching the keyrings
#[test]
fn test_missing_parameters() {
    let base = TempDir::new().unwrap();
    let (mut engine, invoker) = engine(&base);

    let err = engine.encrypt(b"data", &EncryptParams::new(Vec::new())).unwrap_err();
    assert!(matches!(err, GpgError::MissingParameter(ref name) if name == "recipient_keys"));

    let err = engine
        .encrypt(b"", &EncryptParams::new(vec![b"key".as_slice()]))
        .unwrap_err();
    assert!(matches!(err, GpgError::MissingParameter(_)));

    let err = engine
        .verify(&VerifyParams::detached(b"", b"sig", b"content"))
        .unwrap_err();
    assert!(matches!(err, GpgError::MissingParameter(ref name) if name == "public_key"));

    assert_eq!(invoker.operations(), 0);
    assert!(engine.keyrings().keyring(KeyringKind::Public).is_none());
    assert!(engine.keyrings().keyring(KeyringKind::Private).is_none());
}

/// Test resource limits on inputs
#[test]
fn test_resource_limits() {
    let base = TempDir::new().unwrap();
    let (mut engine, invoker) = engine(&base);

    let too_many: Vec<&[u8]> = vec![b"key".as_slice(); MAX_RECIPIENTS + 1];
    let err = engine.encrypt(b"data", &EncryptParams::new(too_many)).unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    let huge_key = vec![0x99u8; MAX_KEY_SIZE + 1];
    let err = engine
        .import_keys(&[huge_key.as_slice()], KeyringKind::Public)
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    let err = engine
        .sign(
            b"content",
            &SignParams::new(b"pub", b"sec", "pw").with_digest("ROT13"),
        )
        .unwrap_err();
    assert!(matches!(err, GpgError::InvalidInput(_)));

    let huge_message = vec![0x8cu8; MAX_MESSAGE_SIZE + 1];
    let err = engine
        .is_encrypted_symmetrically(&huge_message)
        .unwrap_err();
    assert!(matches!(err, GpgError::Validation(_)));

    assert_eq!(invoker.operations(), 0);
}

/// Test that a bad-signature report wins over a good one in the same run
#[test]
fn test_conflicting_verdicts() {
    let base = TempDir::new().unwrap();
    let (mut engine, invoker) = engine(&base);

    invoker.queue(InvocationResult {
        status: StatusLog::parse("[GNUPG:] IMPORT_OK 1 0123456789ABCDEF0123456789ABCDEF12345678\n"),
        exit_code: Some(0),
        ..Default::default()
    });
    invoker.queue(InvocationResult {
        stderr: "gpg: Good signature from \"Alice\"\ngpg: BAD signature from \"Alice\"\n"
            .to_string(),
        status: StatusLog::parse("[GNUPG:] GOODSIG 1234567890ABCDEF Alice\n"),
        exit_code: Some(1),
        ..Default::default()
    });

    let err = engine
        .verify(&VerifyParams::detached(b"pub", b"sig", b"content"))
        .unwrap_err();
    assert!(matches!(err, GpgError::BadSignature(_)), "{:?}", err);
}

/// Test that an engine claiming success without output is not trusted
#[test]
fn test_silent_engine() {
    let base = TempDir::new().unwrap();
    let (mut engine, _invoker) = engine(&base);

    let err = engine
        .decrypt(b"ciphertext", &DecryptParams::symmetric("pw"))
        .unwrap_err();
    assert!(matches!(err, GpgError::DecryptionFailed(_)));

    let err = engine
        .encrypt_symmetric(b"data", &SymmetricEncryptParams::new("pw"))
        .unwrap_err();
    assert!(matches!(err, GpgError::EngineDiagnostic(_)));
}

/// Test that the scratch home stays inside the configured base and is removed
#[test]
fn test_scratch_containment() {
    let base = TempDir::new().unwrap();
    let (engine, _invoker) = engine(&base);

    let home = engine.home().to_path_buf();
    assert!(home.starts_with(base.path()));
    assert!(home
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("gpgbridge-")));

    drop(engine);
    assert!(!home.exists());
    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
}
