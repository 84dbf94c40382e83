//! Parsers for the engine's text protocols.
//!
//! The engine describes keys and messages in a human-oriented packet dump
//! (`--list-packets`), lists fingerprints in a colon-delimited format and
//! reports signature verdicts on stderr. This module turns all three into
//! typed records. Everything here is a pure function of its input text.

pub mod digest;
pub mod listing;
pub mod section;
pub mod userid;
pub mod verdict;

pub use digest::DigestAlgorithm;
pub use listing::{key_id_from_fingerprint, parse_fingerprints, FingerprintMap};
pub use verdict::{check_signature_verdict, SignatureVerdict};

use once_cell::sync::Lazy;
use regex::Regex;
use section::{classify_header, Cursor, Section, SignatureOwner, Transition};
use serde::Serialize;
use std::collections::BTreeMap;

/// Slot name of the signature not bound to any user id
pub const ANONYMOUS: &str = "anonymous";

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

static KEY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"version (\d+), algo (\d+), created (\d+), expires (\d+)")
        .expect("valid key header regex")
});
static KEY_BITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pkey\[0\]: \[(\d+) bits\]").expect("valid key size regex"));
static KEY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"keyid: ([0-9A-Fa-f]+)").expect("valid keyid regex"));
static SIG_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"algo (\d+), keyid ([0-9A-Fa-f]+)").expect("valid signature header regex")
});
static SIG_CREATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"version \d+, created (\d+)").expect("valid signature created regex")
});
static SIG_DIGEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"digest algo (\d+)").expect("valid digest regex"));
static KEY_EXPIRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"key expires after ((?:\d+[ydhm])+)").expect("valid key expiry regex")
});
static SIG_EXPIRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"sig expires after ((?:\d+[ydhm])+)").expect("valid signature expiry regex")
});
static ISSUER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"issuer key ID ([0-9A-Fa-f]+)").expect("valid issuer regex")
});
static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)([ydhm])").expect("valid duration regex"));

/// Public or secret key packet fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyMaterialInfo {
    pub version: Option<u32>,
    pub algorithm: Option<u32>,
    /// Creation time, seconds since the epoch
    pub created: Option<u64>,
    /// Expiry from the key packet itself (v3 keys); `None` when the packet says 0
    pub expires: Option<u64>,
    pub bits: Option<u32>,
    /// `0x` + 16 upper-case hex digits
    pub key_id: Option<String>,
}

/// One signature, optionally with the user id it certifies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    pub name: Option<String>,
    pub comment: Option<String>,
    pub email: Option<String>,
    /// Signer key id
    pub key_id: Option<String>,
    pub created: Option<u64>,
    /// Signature creation plus the key validity period it declares
    pub expires: Option<u64>,
    /// Signature creation plus the signature validity period
    pub sig_expires: Option<u64>,
    pub digest: Option<DigestAlgorithm>,
    pub micalg: Option<String>,
}

/// Everything the packet dump says about one key, or about one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyPacketInfo {
    /// Position of the key within the parsed blob, starting at 0
    pub index: usize,
    pub public_key: Option<KeyMaterialInfo>,
    pub secret_key: Option<KeyMaterialInfo>,
    /// `id1`, `id2`, ... per user id, plus [`ANONYMOUS`]
    pub signature: BTreeMap<String, SignatureInfo>,
    pub literal_data: bool,
    pub encrypted_data: bool,
}

impl KeyPacketInfo {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    fn has_key(&self) -> bool {
        self.public_key.is_some() || self.secret_key.is_some()
    }

    fn is_blank(&self) -> bool {
        !self.has_key() && self.signature.is_empty() && !self.literal_data && !self.encrypted_data
    }

    /// Primary key packet, public or secret
    pub fn key(&self) -> Option<&KeyMaterialInfo> {
        self.public_key.as_ref().or(self.secret_key.as_ref())
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key().and_then(|key| key.key_id.as_deref())
    }

    /// Signature slot of the n-th user id (1-based)
    pub fn user_id(&self, n: usize) -> Option<&SignatureInfo> {
        self.signature.get(&user_id_slot(n))
    }

    pub fn anonymous(&self) -> Option<&SignatureInfo> {
        self.signature.get(ANONYMOUS)
    }

    /// `micalg` of the self or message signature
    pub fn micalg(&self) -> Option<&str> {
        self.anonymous().and_then(|sig| sig.micalg.as_deref())
    }

    /// Key expiry: the key packet's own expiry, else the earliest user id self-signature expiry
    pub fn expires_at(&self) -> Option<u64> {
        if let Some(expires) = self.key().and_then(|key| key.expires) {
            return Some(expires);
        }
        let own = self.key_id();
        self.signature
            .iter()
            .filter(|(slot, _)| slot.as_str() != ANONYMOUS)
            .filter(|(_, sig)| own.is_none() || sig.key_id.as_deref() == own)
            .filter_map(|(_, sig)| sig.expires)
            .min()
    }

    /// Whether the key had expired at `now` (seconds since the epoch)
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at().map_or(false, |expires| expires <= now)
    }

    /// Fill in a key id learned elsewhere and re-derive the self-signature micalg
    pub fn backfill_key_id(&mut self, key_id: &str) {
        for key in [self.public_key.as_mut(), self.secret_key.as_mut()]
            .into_iter()
            .flatten()
        {
            if key.key_id.is_none() {
                key.key_id = Some(key_id.to_string());
            }
        }

        if self.micalg().is_some() {
            return;
        }
        let digest = self
            .signature
            .values()
            .filter(|sig| sig.key_id.as_deref() == Some(key_id))
            .find_map(|sig| sig.digest);
        if let Some(digest) = digest {
            self.mark_self_digest(digest);
        }
    }

    fn mark_self_digest(&mut self, digest: DigestAlgorithm) {
        let anonymous = self.signature.entry(ANONYMOUS.to_string()).or_default();
        anonymous.digest.get_or_insert(digest);
        anonymous.micalg.get_or_insert_with(|| digest.micalg());
    }
}

fn user_id_slot(n: usize) -> String {
    format!("id{}", n)
}

/// Parse a relative duration such as `2y0d0h0m`; any component may be absent
pub fn parse_duration(text: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut seen = false;
    for part in DURATION_PART.captures_iter(text) {
        let value: u64 = part[1].parse().ok()?;
        let unit = match &part[2] {
            "y" => SECONDS_PER_YEAR,
            "d" => SECONDS_PER_DAY,
            "h" => SECONDS_PER_HOUR,
            _ => SECONDS_PER_MINUTE,
        };
        total = total.checked_add(value.checked_mul(unit)?)?;
        seen = true;
    }
    seen.then_some(total)
}

fn normalize_key_id(raw: &str) -> Option<String> {
    key_id_from_fingerprint(raw)
}

fn number<T: std::str::FromStr>(captures: &regex::Captures<'_>, index: usize) -> Option<T> {
    captures.get(index).and_then(|m| m.as_str().parse().ok())
}

/// Signature fields gathered until the next packet header
#[derive(Debug, Default)]
struct SignatureDraft {
    key_id: Option<String>,
    issuer: Option<String>,
    created: Option<u64>,
    digest_code: Option<u32>,
    key_validity: Option<u64>,
    sig_validity: Option<u64>,
}

impl SignatureDraft {
    fn absorb(&mut self, line: &str) {
        if let Some(c) = SIG_HEADER.captures(line) {
            self.key_id = normalize_key_id(&c[2]);
        }
        if let Some(c) = SIG_CREATED.captures(line) {
            self.created = number(&c, 1);
        }
        if let Some(c) = SIG_DIGEST.captures(line) {
            self.digest_code = number(&c, 1);
        }
        if let Some(c) = KEY_EXPIRES.captures(line) {
            self.key_validity = parse_duration(&c[1]);
        }
        if let Some(c) = SIG_EXPIRES.captures(line) {
            self.sig_validity = parse_duration(&c[1]);
        }
        if let Some(c) = ISSUER.captures(line) {
            self.issuer = normalize_key_id(&c[1]);
        }
    }

    fn finish(self) -> SignatureInfo {
        let digest = self.digest_code.and_then(DigestAlgorithm::from_code);
        let after = |validity: Option<u64>| {
            self.created
                .zip(validity)
                .and_then(|(created, validity)| created.checked_add(validity))
        };
        SignatureInfo {
            key_id: self.key_id.clone().or_else(|| self.issuer.clone()),
            created: self.created,
            expires: after(self.key_validity),
            sig_expires: after(self.sig_validity),
            micalg: digest.map(DigestAlgorithm::micalg),
            digest,
            ..Default::default()
        }
    }
}

struct PacketParser {
    records: Vec<KeyPacketInfo>,
    cursor: Cursor,
    draft: Option<(SignatureOwner, SignatureDraft)>,
}

impl PacketParser {
    fn new() -> Self {
        Self {
            records: vec![KeyPacketInfo::new(0)],
            cursor: Cursor::default(),
            draft: None,
        }
    }

    fn current(&mut self) -> &mut KeyPacketInfo {
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    fn feed(&mut self, line: &str) {
        if let Some(kind) = classify_header(line) {
            self.commit_signature();
            if self.cursor.enter(kind) == Transition::StartKey && !self.current().is_blank() {
                let index = self.records.len();
                self.records.push(KeyPacketInfo::new(index));
            }
            self.open_section(line);
            return;
        }

        match self.cursor.section() {
            Section::PublicKey | Section::SecretKey => self.absorb_key_line(line),
            Section::Signature(_) => {
                if let Some((_, draft)) = self.draft.as_mut() {
                    draft.absorb(line);
                }
            }
            _ => {}
        }
    }

    /// Handle the header line of the section just entered
    fn open_section(&mut self, header: &str) {
        match self.cursor.section() {
            Section::PublicKey => self.current().public_key = Some(KeyMaterialInfo::default()),
            Section::SecretKey => self.current().secret_key = Some(KeyMaterialInfo::default()),
            Section::UserId(n) => self.open_user_id(n, header),
            Section::Signature(owner) => {
                let mut draft = SignatureDraft::default();
                draft.absorb(header);
                self.draft = Some((owner, draft));
            }
            Section::LiteralData => self.current().literal_data = true,
            Section::EncryptedData => self.current().encrypted_data = true,
            Section::None | Section::Subordinate | Section::Other => {}
        }
    }

    fn open_user_id(&mut self, n: usize, header: &str) {
        let parsed = userid::quoted_user_id(header)
            .map(userid::unescape)
            .and_then(|text| userid::parse_user_id(&text));
        // Unparsable user ids leave no slot but still consume their number
        if let Some(uid) = parsed {
            self.current().signature.insert(
                user_id_slot(n),
                SignatureInfo {
                    name: Some(uid.name),
                    comment: uid.comment,
                    email: Some(uid.email),
                    ..Default::default()
                },
            );
        }
    }

    fn absorb_key_line(&mut self, line: &str) {
        let key = match self.cursor.section() {
            Section::PublicKey => self.current().public_key.as_mut(),
            _ => self.current().secret_key.as_mut(),
        };
        let Some(key) = key else { return };

        if let Some(c) = KEY_HEADER.captures(line) {
            key.version = number(&c, 1);
            key.algorithm = number(&c, 2);
            key.created = number(&c, 3);
            key.expires = number::<u64>(&c, 4).filter(|&expires| expires != 0);
        }
        if let Some(c) = KEY_BITS.captures(line) {
            key.bits = number(&c, 1);
        }
        if let Some(c) = KEY_ID.captures(line) {
            key.key_id = normalize_key_id(&c[1]);
        }
    }

    fn commit_signature(&mut self) {
        let Some((owner, draft)) = self.draft.take() else {
            return;
        };
        let signature = draft.finish();
        let record = self.current();
        let own = record.key_id().map(str::to_string);
        let is_self = own.is_some() && signature.key_id == own;

        if let (true, Some(digest)) = (is_self, signature.digest) {
            record.mark_self_digest(digest);
        }

        match owner {
            SignatureOwner::UserId(n) => {
                let Some(slot) = record.signature.get_mut(&user_id_slot(n)) else {
                    return;
                };
                let unsigned = slot.created.is_none() && slot.key_id.is_none();
                let upgrade = is_self && slot.key_id != own;
                if unsigned || upgrade {
                    slot.key_id = signature.key_id;
                    slot.created = signature.created;
                    slot.expires = signature.expires;
                    slot.sig_expires = signature.sig_expires;
                    slot.digest = signature.digest;
                    slot.micalg = signature.micalg;
                }
            }
            SignatureOwner::Anonymous => {
                let slot = record.signature.entry(ANONYMOUS.to_string()).or_default();
                if slot.created.is_none() && slot.key_id.is_none() {
                    let micalg = slot.micalg.take();
                    let digest = slot.digest.take();
                    *slot = signature;
                    if slot.micalg.is_none() {
                        slot.micalg = micalg;
                        slot.digest = digest;
                    }
                }
            }
            SignatureOwner::Subordinate => {}
        }
    }

    fn finish(mut self) -> Vec<KeyPacketInfo> {
        self.commit_signature();
        self.records.retain(|record| !record.is_blank());
        for (index, record) in self.records.iter_mut().enumerate() {
            record.index = index;
        }
        self.records
    }
}

/// Parse `--list-packets` output into one record per key, in blob order.
///
/// Content that precedes any key packet (a detached signature, an encrypted
/// message) forms a record of its own. Lines the parser does not understand
/// are ignored.
pub fn parse_packets(dump: &str) -> Vec<KeyPacketInfo> {
    let mut parser = PacketParser::new();
    for line in dump.lines() {
        parser.feed(line.trim_end_matches('\r'));
    }
    parser.finish()
}

/// Apply key ids from a fingerprint listing to records whose dump omitted them.
///
/// Records and listing entries are matched by position; records that
/// already carry a key id are left alone.
pub fn backfill_key_ids(records: &mut [KeyPacketInfo], listing: &FingerprintMap) {
    let mut listed = listing.iter().map(|(key_id, _)| key_id);
    for record in records.iter_mut().filter(|record| record.has_key()) {
        let Some(key_id) = listed.next() else { break };
        if record.key_id().is_none() {
            record.backfill_key_id(key_id);
        }
    }
}
