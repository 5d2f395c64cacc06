use crate::err::DeserializationResult;

use std::fmt::{self, Debug, Display, Write as _};
use std::io::{self, Cursor, Write};
use std::str::FromStr;
use thiserror::Error;

/// A 128-bit identifier, kept as the 16 bytes found on disk.
///
/// The textual form is those bytes in storage order, grouped 8-4-4-4-12.
/// No field is byte-swapped, so the text of a GUID read from an image matches
/// what other tooling for these images prints and accepts.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
pub struct Guid([u8; 16]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseGuidError {
    #[error("expected 32 hex digits in 8-4-4-4-12 groups, found `{0}`")]
    InvalidFormat(String),
}

impl Guid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Guid {
        Guid(bytes)
    }

    /// Parses a `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` literal at compile time.
    pub const fn from_str_const(s: &str) -> Guid {
        let s = s.as_bytes();
        assert!(s.len() == 36, "GUID literal must be 36 characters long");

        let mut out = [0_u8; 16];
        let mut i = 0;
        let mut j = 0;
        while i < s.len() {
            if s[i] == b'-' {
                i += 1;
                continue;
            }
            out[j] = (hex_nibble_const(s[i]) << 4) | hex_nibble_const(s[i + 1]);
            i += 2;
            j += 1;
        }
        assert!(j == 16, "GUID literal must contain 32 hex digits");
        Guid(out)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_stream(stream: &mut Cursor<&[u8]>, what: &'static str) -> DeserializationResult<Guid> {
        Ok(Guid(try_read_array!(stream, 16, what)))
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.0)
    }
}

const fn hex_nibble_const(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in GUID literal"),
    }
}

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseGuidError::InvalidFormat(s.to_owned());

        let groups: Vec<&str> = s.split('-').collect();
        let lengths = groups.iter().map(|g| g.len()).collect::<Vec<_>>();
        if lengths != [8, 4, 4, 4, 12] {
            return Err(invalid());
        }

        let digits = groups.concat();
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut out = [0_u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2).ok_or_else(invalid)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }

        Ok(Guid(out))
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // We know ahead of time how much space we need.
        let mut s = String::with_capacity(36);
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                s.push('-');
            }
            write!(&mut s, "{:02x}", b)?;
        }
        f.write_str(&s)
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
