//! Section cursor over `--list-packets` output.
//!
//! Every packet starts with a header line such as `:public key packet:`.
//! The header decides the section that all following lines belong to until
//! the next header. Lines inside a section the parser does not care about
//! are dropped.

use serde::Serialize;

/// Packet header kinds the cursor distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    PublicKey,
    SecretKey,
    Subkey,
    UserId,
    Attribute,
    Signature,
    LiteralData,
    EncryptedData,
    /// Recognized, but leaves signature ownership untouched
    Transparent,
}

const HEADERS: &[(&str, HeaderKind)] = &[
    (":public key packet:", HeaderKind::PublicKey),
    (":secret key packet:", HeaderKind::SecretKey),
    (":public sub key packet:", HeaderKind::Subkey),
    (":secret sub key packet:", HeaderKind::Subkey),
    (":user id packet:", HeaderKind::UserId),
    (":attribute packet:", HeaderKind::Attribute),
    (":signature packet:", HeaderKind::Signature),
    (":literal data packet:", HeaderKind::LiteralData),
    (":encrypted data packet:", HeaderKind::EncryptedData),
    (":aead encrypted packet", HeaderKind::EncryptedData),
    (":compressed packet:", HeaderKind::Transparent),
    (":onepass_sig packet:", HeaderKind::Transparent),
    (":pubkey enc packet:", HeaderKind::Transparent),
    (":symkey enc packet:", HeaderKind::Transparent),
    (":marker packet:", HeaderKind::Transparent),
    (":trust packet:", HeaderKind::Transparent),
];

/// Classify a line as a packet header
pub fn classify_header(line: &str) -> Option<HeaderKind> {
    let line = line.trim_start();
    if !line.starts_with(':') {
        return None;
    }
    let lower = line.to_ascii_lowercase();
    HEADERS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
}

/// What a signature packet is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureOwner {
    /// The n-th user id of the current key, starting at 1
    UserId(usize),
    /// A subkey or user attribute
    Subordinate,
    /// Nothing identifiable: a detached or message signature, or a direct-key signature
    Anonymous,
}

/// Section the current line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    None,
    PublicKey,
    SecretKey,
    UserId(usize),
    Signature(SignatureOwner),
    Subordinate,
    LiteralData,
    EncryptedData,
    Other,
}

/// Effect of a header on the records being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new primary key begins
    StartKey,
    /// Stay on the current key
    Continue,
}

/// The cursor: current section plus the owner the next signature packet binds to
#[derive(Debug, Clone)]
pub struct Cursor {
    section: Section,
    owner: SignatureOwner,
    user_ids: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            section: Section::None,
            owner: SignatureOwner::Anonymous,
            user_ids: 0,
        }
    }
}

impl Cursor {
    pub fn section(&self) -> Section {
        self.section
    }

    /// Move to the section a header opens
    pub fn enter(&mut self, kind: HeaderKind) -> Transition {
        match kind {
            HeaderKind::PublicKey | HeaderKind::SecretKey => {
                self.section = if kind == HeaderKind::PublicKey {
                    Section::PublicKey
                } else {
                    Section::SecretKey
                };
                self.owner = SignatureOwner::Anonymous;
                self.user_ids = 0;
                return Transition::StartKey;
            }
            HeaderKind::Subkey | HeaderKind::Attribute => {
                self.section = Section::Subordinate;
                self.owner = SignatureOwner::Subordinate;
            }
            HeaderKind::UserId => {
                self.user_ids += 1;
                self.section = Section::UserId(self.user_ids);
                self.owner = SignatureOwner::UserId(self.user_ids);
            }
            HeaderKind::Signature => {
                self.section = Section::Signature(self.owner);
            }
            HeaderKind::LiteralData => {
                self.section = Section::LiteralData;
                self.owner = SignatureOwner::Anonymous;
            }
            HeaderKind::EncryptedData => {
                self.section = Section::EncryptedData;
                self.owner = SignatureOwner::Anonymous;
            }
            HeaderKind::Transparent => {
                self.section = Section::Other;
            }
        }
        Transition::Continue
    }
}
