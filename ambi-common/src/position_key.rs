//! Fractional position keys for queue ordering
//!
//! A key is a base-62 digit string read as the fraction `0.d1d2d3…`. Keys
//! compare lexicographically (plain byte order, which matches digit order for
//! the alphabet below), so there is always a key strictly between any two
//! distinct keys and inserting one never touches its neighbors.
//!
//! Keys never end in `'0'`: that keeps the representation unique and
//! guarantees room below every key. Repeated insertion into the same gap
//! grows key length by roughly one digit per six insertions; callers that
//! see [`PositionKey::needs_renormalization`] re-space the whole sequence with
//! [`PositionKey::evenly_spaced`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digit alphabet in ascending ASCII order
const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: usize = 62;

/// Key length above which the owning sequence should be renormalized
pub const MAX_KEY_LEN: usize = 64;

/// Sortable, arbitrary-precision queue position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PositionKey(String);

fn digit_value(c: u8) -> Option<usize> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 10),
        b'a'..=b'z' => Some((c - b'a') as usize + 36),
        _ => None,
    }
}

/// Append to `out` the shortest digits strictly between `a` and `b`
///
/// `a` may be empty (the fraction 0); `b == None` means the open upper bound 1.
/// Both inputs must be valid keys with `a < b`.
fn midpoint(a: &[u8], b: Option<&[u8]>, out: &mut Vec<u8>) {
    if let Some(b) = b {
        // Strip the common prefix, padding `a` with zeros.
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(b'0') == b[n] {
            n += 1;
        }
        if n > 0 {
            out.extend_from_slice(&b[..n]);
            let rest_a = a.get(n..).unwrap_or(&[]);
            midpoint(rest_a, Some(&b[n..]), out);
            return;
        }
    }

    let digit_a = a.first().and_then(|&c| digit_value(c)).unwrap_or(0);
    let digit_b = b
        .and_then(|b| b.first())
        .and_then(|&c| digit_value(c))
        .unwrap_or(BASE);

    if digit_b > digit_a + 1 {
        out.push(DIGITS[(digit_a + digit_b + 1) / 2]);
    } else if let Some(b) = b.filter(|b| b.len() > 1) {
        out.push(b[0]);
    } else {
        // Consecutive first digits: keep a's digit and go one level deeper
        // with no upper bound.
        out.push(DIGITS[digit_a]);
        midpoint(a.get(1..).unwrap_or(&[]), None, out);
    }
}

impl PositionKey {
    /// Parse and validate a stored key
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidKey("empty position key".to_string()));
        }
        if let Some(bad) = s.bytes().find(|c| digit_value(*c).is_none()) {
            return Err(Error::InvalidKey(format!(
                "invalid character '{}' in position key '{}'",
                bad as char, s
            )));
        }
        if s.ends_with('0') {
            return Err(Error::InvalidKey(format!(
                "position key '{}' has a trailing zero",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Key strictly between `lo` and `hi`
    ///
    /// `None` extends the range to the corresponding open end, so
    /// `between(Some(max), None)` appends and `between(None, Some(min))`
    /// prepends.
    pub fn between(lo: Option<&PositionKey>, hi: Option<&PositionKey>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (lo, hi) {
            if lo >= hi {
                return Err(Error::InvalidKey(format!(
                    "lower bound '{}' is not below upper bound '{}'",
                    lo, hi
                )));
            }
        }

        let a = lo.map(|k| k.0.as_bytes()).unwrap_or(&[]);
        let b = hi.map(|k| k.0.as_bytes());
        let mut out = Vec::with_capacity(a.len().max(b.map_or(0, <[u8]>::len)) + 1);
        midpoint(a, b, &mut out);

        // Only alphabet bytes are ever pushed.
        String::from_utf8(out)
            .map(Self)
            .map_err(|e| Error::Internal(format!("non-ascii position key: {}", e)))
    }

    /// First key of an empty sequence
    pub fn first() -> Self {
        Self("V".to_string())
    }

    /// Key just above `self` with nothing above it
    pub fn after(&self) -> Result<Self> {
        Self::between(Some(self), None)
    }

    /// Key just below `self` with nothing below it
    pub fn before(&self) -> Result<Self> {
        Self::between(None, Some(self))
    }

    /// `n` fixed-width keys spread evenly over the key space, ascending
    pub fn evenly_spaced(n: usize) -> Vec<Self> {
        if n == 0 {
            return Vec::new();
        }

        let slots = n as u128 + 1;
        let mut width = 1u32;
        let mut space = BASE as u128;
        while space <= slots {
            width += 1;
            space *= BASE as u128;
        }

        (1..=n as u128)
            .map(|i| {
                let mut value = i * space / slots;
                let mut digits = vec![b'0'; width as usize];
                for slot in digits.iter_mut().rev() {
                    *slot = DIGITS[(value % BASE as u128) as usize];
                    value /= BASE as u128;
                }
                while digits.last() == Some(&b'0') {
                    digits.pop();
                }
                Self(digits.into_iter().map(char::from).collect())
            })
            .collect()
    }

    /// Whether this key has grown past [`MAX_KEY_LEN`]
    pub fn needs_renormalization(&self) -> bool {
        self.0.len() > MAX_KEY_LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PositionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PositionKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PositionKey> for String {
    fn from(key: PositionKey) -> Self {
        key.0
    }
}
