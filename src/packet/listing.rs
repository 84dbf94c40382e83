//! Colon-delimited key listings (`--with-colons --with-fingerprint`).

use serde::Serialize;
use std::collections::HashMap;

const KEY_ID_HEX_DIGITS: usize = 16;
const KEY_ID_FIELD: usize = 4;
const FINGERPRINT_FIELD: usize = 9;

/// Key id to fingerprint mapping, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FingerprintMap {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FingerprintMap {
    /// Record a pair; a repeated key id keeps its position and takes the new fingerprint
    pub fn insert(&mut self, key_id: String, fingerprint: String) {
        match self.index.get(&key_id) {
            Some(&position) => self.entries[position].1 = fingerprint,
            None => {
                self.index.insert(key_id.clone(), self.entries.len());
                self.entries.push((key_id, fingerprint));
            }
        }
    }

    pub fn get(&self, key_id: &str) -> Option<&str> {
        self.index
            .get(key_id)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key_id, fingerprint)` pairs in listing order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key_id, fingerprint)| (key_id.as_str(), fingerprint.as_str()))
    }

    /// Key id of the first listed key
    pub fn first_key_id(&self) -> Option<&str> {
        self.entries.first().map(|(key_id, _)| key_id.as_str())
    }

    pub fn fingerprints(&self) -> Vec<String> {
        self.entries.iter().map(|(_, fpr)| fpr.clone()).collect()
    }
}

/// Normalize the trailing 16 hex digits of a key id or fingerprint to `0x` + upper case
pub fn key_id_from_fingerprint(value: &str) -> Option<String> {
    let value = value.trim();
    let value = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let tail = &value[value.len().saturating_sub(KEY_ID_HEX_DIGITS)..];
    Some(format!("0x{}", tail.to_ascii_uppercase()))
}

/// Correlate `pub`/`sec` records with the `fpr` record that follows them.
///
/// Subkey fingerprints are skipped: only a pending primary key id can
/// consume an `fpr` line. An empty map means nothing recognizable was listed.
pub fn parse_fingerprints(listing: &str) -> FingerprintMap {
    let mut map = FingerprintMap::default();
    let mut pending: Option<String> = None;

    for line in listing.lines() {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(':').collect();
        match fields[0] {
            "pub" | "sec" => {
                pending = fields
                    .get(KEY_ID_FIELD)
                    .and_then(|field| key_id_from_fingerprint(field));
            }
            "fpr" => {
                let fingerprint = fields
                    .get(FINGERPRINT_FIELD)
                    .map(|f| f.trim())
                    .filter(|f| !f.is_empty());
                if let (Some(key_id), Some(fingerprint)) = (pending.take(), fingerprint) {
                    map.insert(key_id, fingerprint.to_ascii_uppercase());
                }
            }
            _ => {}
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
pub:-:2048:1:1234567890ABCDEF:1577836800:::-:::scESC::::::23::0:
fpr:::::::::0123456789ABCDEF0123456789ABCDEF12345678:
uid:-::::1577836800::9D1E1F5A3F0F1B7A5C6D7E8F9A0B1C2D3E4F5A6B::Alice <alice@example.com>::::::::::0:
sub:-:2048:1:FEDCBA0987654321:1577836800::::::e::::::23:
fpr:::::::::99999999999999999999999999FEDCBA0987654321:
pub:-:255:22:AAAABBBBCCCCDDDD:1600000000:::-:::scESC::::::ed25519:::0:
fpr:::::::::1111222233334444555566667777AAAABBBBCCCCDDDD:
";

    #[test]
    fn test_parse_listing() {
        let map = parse_fingerprints(LISTING);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("0x1234567890ABCDEF"),
            Some("0123456789ABCDEF0123456789ABCDEF12345678")
        );
        assert_eq!(
            map.get("0xAAAABBBBCCCCDDDD"),
            Some("1111222233334444555566667777AAAABBBBCCCCDDDD")
        );
        assert_eq!(map.first_key_id(), Some("0x1234567890ABCDEF"));
        assert!(map.get("0xFEDCBA0987654321").is_none());
    }

    #[test]
    fn test_no_pairs_is_empty() {
        assert!(parse_fingerprints("").is_empty());
        assert!(parse_fingerprints("tru::1:1600000000:0:3:1:5\n").is_empty());
        assert!(parse_fingerprints("fpr:::::::::ABCDEF:\n").is_empty());
        assert!(parse_fingerprints("pub:-:2048:1:1234567890ABCDEF:0:::-:\n").is_empty());
    }

    #[test]
    fn test_pending_is_replaced_by_next_pub() {
        let listing = "\
pub:-:2048:1:1111111111111111:0:::-:
pub:-:2048:1:2222222222222222:0:::-:
fpr:::::::::AAAA2222222222222222:
";
        let map = parse_fingerprints(listing);
        assert_eq!(map.len(), 1);
        assert!(map.get("0x2222222222222222").is_some());
    }

    #[test]
    fn test_repeated_key_id_last_wins() {
        let listing = "\
pub:-:2048:1:1111111111111111:0:::-:
fpr:::::::::OLD1111111111111111:
pub:-:2048:1:1111111111111111:0:::-:
fpr:::::::::NEW1111111111111111:
";
        let map = parse_fingerprints(listing);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("0x1111111111111111"), Some("NEW1111111111111111"));
    }

    #[test]
    fn test_key_id_from_fingerprint() {
        assert_eq!(
            key_id_from_fingerprint("0123456789abcdef0123456789abcdef12345678").as_deref(),
            Some("0x89ABCDEF12345678")
        );
        assert_eq!(
            key_id_from_fingerprint("0xdeadbeef").as_deref(),
            Some("0xDEADBEEF")
        );
        assert_eq!(key_id_from_fingerprint("not hex"), None);
        assert_eq!(key_id_from_fingerprint(""), None);
    }
}
