//! Trade-link parsing and validation.
//!
//! A trade link has the fixed shape
//! `http(s)://trade.example.com/tradeoffer/new/?partner=<accountId>&token=<token>`,
//! matched case-insensitively except for the token, which is opaque and
//! passed through to fulfillment untouched. Validation fails closed:
//! anything that does not match the shape exactly is rejected, and only the
//! platform's own host is accepted; a link pointing anywhere else is a
//! substitution attempt, not a typo. On match, the embedded 32-bit account
//! id is encoded to the full 64-bit identity and compared against the
//! requesting owner.

use itemvault_core::{AccountId, OwnerId};

/// The one host trade links may point at.
pub const TRADE_HOST: &str = "trade.example.com";

/// The partner identity and access token embedded in a trade link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeLink {
    pub account_id: AccountId,
    pub token: String,
}

impl TradeLink {
    /// The full 64-bit identity this link belongs to.
    pub fn owner(&self) -> OwnerId {
        OwnerId::from_account(self.account_id)
    }
}

/// Parse a trade link against the fixed pattern. Returns `None` on any
/// deviation from the expected shape.
pub fn parse_trade_link(link: &str) -> Option<TradeLink> {
    let rest = strip_scheme(link)?;

    // Host up to the first slash; the path must follow immediately.
    let (host, path) = rest.split_once('/')?;
    if !host.eq_ignore_ascii_case(TRADE_HOST) {
        return None;
    }

    let rest = strip_prefix_ignore_case(path, "tradeoffer/new/?partner=")?;
    let (digits, token) = split_once_ignore_case(rest, "&token=")?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Account ids are 32-bit; overflow means the link cannot encode a real
    // identity.
    let account_id: u32 = digits.parse().ok()?;

    if token.is_empty() || !token.bytes().all(is_token_byte) {
        return None;
    }

    Some(TradeLink {
        account_id: AccountId::new(account_id),
        token: token.to_string(),
    })
}

/// True iff `link` matches the expected shape and its embedded partner
/// identity encodes exactly to `owner`.
pub fn validate_trade_link(owner: OwnerId, link: &str) -> bool {
    match parse_trade_link(link) {
        Some(parsed) => parsed.owner() == owner,
        None => false,
    }
}

fn strip_scheme(link: &str) -> Option<&str> {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = strip_prefix_ignore_case(link, scheme) {
            return Some(rest);
        }
    }
    None
}

/// `str::strip_prefix`, ASCII-case-insensitively. `prefix` must be ASCII.
fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// `str::split_once`, ASCII-case-insensitively. `sep` must be ASCII.
fn split_once_ignore_case<'a>(s: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    (0..=s.len().checked_sub(sep.len())?).find_map(|i| {
        let candidate = s.get(i..i + sep.len())?;
        candidate
            .eq_ignore_ascii_case(sep)
            .then(|| (&s[..i], &s[i + sep.len()..]))
    })
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}
