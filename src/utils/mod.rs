use core::fmt;
use core::num::ParseIntError;

use alloc::string::String;
use bstr::BString;

use crate::{error::FormatError, storage::Storage, HacResult};

pub mod string_table;

pub(crate) mod sealed {
    pub trait Sealed {}
}

pub(crate) fn other_io_error(
    e: impl core::error::Error + Send + Sync + 'static,
) -> binrw::io::Error {
    use binrw::io::*;

    Error::new(ErrorKind::Other, e)
}

#[derive(thiserror_no_std::Error, Clone, Debug)]
pub enum ParseKeyError {
    #[error("keystr did not match the size requested")]
    LengthMismatch {
        requested_key_len: usize,
        actual_key_len: usize,
    },

    #[error("failed parsing an int from the str")]
    ParseIntError(#[from] ParseIntError),
}

pub fn hex_str_to_array<const N: usize>(s: &str) -> Result<[u8; N], ParseKeyError> {
    let mut buf = [0; N];

    if s.len() % 2 != 0 || (s.len() / 2) != buf.len() {
        return Err(ParseKeyError::LengthMismatch {
            requested_key_len: N,
            actual_key_len: s.len() / 2,
        });
    }

    for (buf_idx, str_idx) in (0..s.len()).step_by(2).enumerate() {
        buf[buf_idx] = u8::from_str_radix(&s[str_idx..][..2], 16)?;
    }

    Ok(buf)
}

pub fn hex_str(b: &[u8]) -> String {
    use core::fmt::Write;

    let mut s = String::with_capacity(b.len() * 2);
    for byte in b {
        write!(s, "{byte:02x}").ok();
    }
    s
}

/// Reads `expected.len()` bytes at `offset` and compares them against `expected`.
pub(crate) fn check_magic(storage: &Storage, offset: u64, expected: &[u8]) -> HacResult<()> {
    let mut found = alloc::vec![0; expected.len()];
    storage.read_exact_at(offset, &mut found)?;

    if found != expected {
        return Err(FormatError::BadMagic {
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: BString::from(found),
        }
        .into());
    }

    Ok(())
}

pub(crate) const fn align_down(value: u64, align: u64) -> u64 {
    value - value % align
}

pub(crate) fn align_up(value: u64, align: u64) -> Option<u64> {
    match value % align {
        0 => Some(value),
        rem => value.checked_add(align - rem),
    }
}

pub fn aes_xtsn_tweak(mut sector: u128) -> [u8; 0x10] {
    let mut tweak = [0; 0x10];
    for b in tweak.iter_mut().rev() {
        *b = (sector & 0xff) as u8;
        sector >>= 8;
    }
    tweak
}

#[binrw::binrw]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HexArray<const N: usize>(pub [u8; N]);

impl<const N: usize> HexArray<N> {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> fmt::Debug for HexArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        <Self as fmt::Display>::fmt(self, f)?;
        write!(f, "]")
    }
}

impl<const N: usize> fmt::Display for HexArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0 {
            write!(f, "{c:02x}")?;
        }
        Ok(())
    }
}
