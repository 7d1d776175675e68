// ABOUTME: Log sequence number codec for logical replication positions
// ABOUTME: Parses, formats and orders the "high/low" hexadecimal LSN text form

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A position in the replication stream.
///
/// The server renders LSNs as two hexadecimal 32-bit words separated by a
/// slash, e.g. `0/16B2D50`. Ordering follows the 64-bit composite value,
/// never the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);
    pub const MAX: Lsn = Lsn(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Lsn(value)
    }

    pub const fn from_parts(high: u32, low: u32) -> Self {
        Lsn(((high as u64) << 32) | low as u64)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// Form used inside file names: the slash becomes a dash.
    pub fn to_file_component(self) -> String {
        format!("{:x}-{:x}", self.high(), self.low())
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}/{:x}", self.high(), self.low())
    }
}

impl FromStr for Lsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (high, low) = s
            .split_once('/')
            .ok_or_else(|| Error::Format(format!("invalid LSN '{}' (expected X/Y)", s)))?;

        Ok(Lsn::from_parts(parse_word(s, high)?, parse_word(s, low)?))
    }
}

// from_str_radix alone would accept a leading '+' and a second '/' would
// end up in the low word, so check the digits first.
fn parse_word(lsn: &str, word: &str) -> Result<u32, Error> {
    if word.is_empty() || !word.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Format(format!(
            "invalid LSN '{}': '{}' is not a hex number",
            lsn, word
        )));
    }
    u32::from_str_radix(word, 16).map_err(|_| {
        Error::Format(format!(
            "invalid LSN '{}': '{}' does not fit in 32 bits",
            lsn, word
        ))
    })
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Lsn(value)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}
