//! Machine-readable status tokens written by the engine to its status file.
//!
//! Each line has the form `[GNUPG:] KEYWORD arg arg ...`. Keywords are
//! locale independent, which makes them the reliable channel for outcomes
//! such as `DECRYPTION_OKAY` regardless of how stderr is translated.

use serde::Serialize;

const STATUS_PREFIX: &str = "[GNUPG:] ";

pub const DECRYPTION_OKAY: &str = "DECRYPTION_OKAY";
pub const DECRYPTION_FAILED: &str = "DECRYPTION_FAILED";
pub const END_ENCRYPTION: &str = "END_ENCRYPTION";
pub const IMPORT_OK: &str = "IMPORT_OK";
pub const KEY_CREATED: &str = "KEY_CREATED";
pub const SIG_CREATED: &str = "SIG_CREATED";
pub const GOODSIG: &str = "GOODSIG";
pub const VALIDSIG: &str = "VALIDSIG";
pub const EXPSIG: &str = "EXPSIG";
pub const EXPKEYSIG: &str = "EXPKEYSIG";
pub const REVKEYSIG: &str = "REVKEYSIG";
pub const BADSIG: &str = "BADSIG";
pub const ERRSIG: &str = "ERRSIG";
pub const NO_PUBKEY: &str = "NO_PUBKEY";
pub const NEED_PASSPHRASE_SYM: &str = "NEED_PASSPHRASE_SYM";

/// One status token with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub keyword: String,
    pub args: Vec<String>,
}

impl StatusLine {
    /// Argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// All status tokens of one invocation, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusLog {
    lines: Vec<StatusLine>,
}

impl StatusLog {
    /// Parse the contents of a status file. Lines without the status prefix are skipped.
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .filter_map(|line| line.strip_prefix(STATUS_PREFIX))
            .filter_map(|rest| {
                let mut fields = rest.split_whitespace();
                let keyword = fields.next()?.to_string();
                Some(StatusLine {
                    keyword,
                    args: fields.map(str::to_string).collect(),
                })
            })
            .collect();
        Self { lines }
    }

    /// Check whether a keyword was emitted
    pub fn has(&self, keyword: &str) -> bool {
        self.lines.iter().any(|line| line.keyword == keyword)
    }

    /// First occurrence of a keyword
    pub fn find(&self, keyword: &str) -> Option<&StatusLine> {
        self.lines.iter().find(|line| line.keyword == keyword)
    }

    /// Every occurrence of a keyword
    pub fn all<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a StatusLine> + 'a {
        self.lines.iter().filter(move |line| line.keyword == keyword)
    }

    /// Keywords in emission order
    pub fn keywords(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.keyword.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
