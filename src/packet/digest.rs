//! OpenPGP hash algorithm identifiers.

use serde::Serialize;
use std::fmt;

/// Hash algorithms the engine reports by numeric code (RFC 4880 §9.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DigestAlgorithm {
    Md5 = 1,
    Sha1 = 2,
    Ripemd160 = 3,
    DoubleSha = 4,
    Md2 = 5,
    Tiger192 = 6,
    Haval5160 = 7,
    Sha256 = 8,
    Sha384 = 9,
    Sha512 = 10,
    Sha224 = 11,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 11] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Ripemd160,
        DigestAlgorithm::DoubleSha,
        DigestAlgorithm::Md2,
        DigestAlgorithm::Tiger192,
        DigestAlgorithm::Haval5160,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha224,
    ];

    /// Map a numeric code; unknown codes yield `None`
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|algo| algo.code() == code)
    }

    /// Look up a canonical name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|algo| algo.name().eq_ignore_ascii_case(name))
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Canonical engine name
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Ripemd160 => "RIPEMD160",
            DigestAlgorithm::DoubleSha => "DOUBLE-SHA",
            DigestAlgorithm::Md2 => "MD2",
            DigestAlgorithm::Tiger192 => "TIGER192",
            DigestAlgorithm::Haval5160 => "HAVAL-5-160",
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha384 => "SHA384",
            DigestAlgorithm::Sha512 => "SHA512",
            DigestAlgorithm::Sha224 => "SHA224",
        }
    }

    /// `micalg` parameter value for a `multipart/signed` part
    pub fn micalg(self) -> String {
        format!("pgp-{}", self.name().to_ascii_lowercase())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
