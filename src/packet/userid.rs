//! User id strings as printed by the packet dump.

use once_cell::sync::Lazy;
use regex::Regex;

static USER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[^<(]*?)\s*(?:\((?P<before>[^)]*)\)\s*)?<(?P<email>[^<>]*)>\s*(?:\((?P<after>[^)]*)\))?$",
    )
    .expect("valid user id regex")
});

/// Components of a `name (comment) <email>` user id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    pub name: String,
    pub comment: Option<String>,
    pub email: String,
}

/// Extract the quoted user id from a `:user id packet: "..."` header
pub fn quoted_user_id(header: &str) -> Option<&str> {
    let start = header.find('"')?;
    let end = header.rfind('"')?;
    (end > start).then(|| &header[start + 1..end])
}

/// Resolve `\xNN` escapes. The dump escapes raw bytes, so the result is
/// decoded as UTF-8 after unescaping, lossily.
pub fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            if let Some(byte) = hex_byte(bytes[i + 2], bytes[i + 3]) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_byte(high: u8, low: u8) -> Option<u8> {
    let digit = |c: u8| (c as char).to_digit(16);
    Some((digit(high)? * 16 + digit(low)?) as u8)
}

/// Split a user id into its parts; `None` when it has no `<email>`
pub fn parse_user_id(text: &str) -> Option<UserId> {
    let captures = USER_ID.captures(text.trim())?;
    let comment = captures
        .name("before")
        .or_else(|| captures.name("after"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty());

    Some(UserId {
        name: captures["name"].trim().to_string(),
        comment,
        email: captures["email"].trim().to_string(),
    })
}
