//! Passphrase handling for engine operations.

use std::fmt;
use zeroize::Zeroize;

/// Passphrase delivered to the engine through its input stream.
///
/// The buffer is wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Create a new passphrase
    pub fn new<S: Into<String>>(passphrase: S) -> Self {
        Self(passphrase.into())
    }

    /// The empty passphrase, used to inspect messages without a secret
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Borrow the passphrase text
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if passphrase is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts() {
        let passphrase = Passphrase::new("hunter2");
        assert_eq!(format!("{:?}", passphrase), "Passphrase(***)");
        assert_eq!(passphrase.expose(), "hunter2");
    }

    #[test]
    fn test_empty() {
        assert!(Passphrase::empty().is_empty());
        assert!(!Passphrase::from("x").is_empty());
    }
}
