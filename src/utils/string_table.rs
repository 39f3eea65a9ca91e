//! Null terminated string table as used by PFS0 and HFS0 headers.

use alloc::{format, vec::Vec};
use bstr::{BStr, ByteSlice};
use core::{fmt, iter::FusedIterator};

use crate::error::FormatError;

/// The raw string table of a partition header. Entries refer to their names
/// by byte offset into this table, every name ends at the next null byte.
///
/// Names are kept as [`bstr::BStr`] since nothing guarantees they are utf8.
#[derive(Clone, PartialEq, Eq)]
#[binrw::binrw]
#[br(import(size: usize))]
pub struct StringTable(#[br(count = size)] Vec<u8>);

impl StringTable {
    /// Creates a StringTable from its raw bytes, padding included.
    ///
    /// # Example
    /// ```
    /// use hacdec::utils::string_table::StringTable;
    ///
    /// let st = StringTable::from_raw(b"main\0main.npdm\0\0\0".to_vec());
    ///
    /// assert_eq!(st.get(5).unwrap(), "main.npdm");
    /// ```
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self(raw.into())
    }

    /// Gets the string starting at byte offset `index`, **not** the nth string.
    pub fn get(&self, index: usize) -> Option<&BStr> {
        self.0.get(index..).and_then(|start| {
            start
                .iter()
                .position(|c| *c == 0)
                .map(|end| start[..end].as_bstr())
        })
    }

    /// Like [`StringTable::get`] but reports a missing terminator or an offset
    /// past the end of the table as a format error.
    pub fn name_at(&self, index: usize) -> Result<&BStr, FormatError> {
        self.get(index).ok_or_else(|| FormatError::Corrupted {
            what: "string table",
            reason: format!(
                "no null terminated name at offset 0x{index:x} (table is 0x{:x} bytes)",
                self.0.len()
            ),
        })
    }

    /// Iterates over all strings, stopping at the first empty one (padding).
    pub fn iter(&self) -> impl Iterator<Item = &BStr> {
        StringTableIter {
            table: self,
            offset: 0,
        }
        .take_while(|s| !s.is_empty())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<[u8]>> FromIterator<S> for StringTable {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut inner = Vec::new();

        for string in iter {
            let s = string.as_ref();

            // only slice up to the first 0 byte
            let slice = &s[..s.find([0]).unwrap_or(s.len())];

            if !slice.is_empty() {
                inner.extend_from_slice(slice);
                inner.push(0);
            }
        }

        Self(inner)
    }
}

impl fmt::Debug for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

struct StringTableIter<'a> {
    table: &'a StringTable,
    offset: usize,
}

impl<'a> Iterator for StringTableIter<'a> {
    type Item = &'a BStr;

    fn next(&mut self) -> Option<Self::Item> {
        self.table.get(self.offset).map(|s| {
            self.offset += s.len() + 1;
            s
        })
    }
}

impl<'a> FusedIterator for StringTableIter<'a> {}

#[cfg(test)]
mod tests {
    use super::StringTable;

    #[test]
    fn from_iterator_strips_null_properly() {
        let strings: &[&[u8]] = &[b"foo", b"foo\0", b"foo\0\0", b"foo\0foo\0\0foo"];
        let table: StringTable = strings.iter().collect();

        for string in table.iter() {
            assert_eq!(string, "foo");
        }

        assert_eq!(table.as_bytes().len(), strings.len() * b"foo\0".len())
    }

    #[test]
    fn padding_ends_iteration() {
        let table = StringTable::from_raw(b"a.nca\0b.nca\0\0\0\0".to_vec());
        let names: Vec<_> = table.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["a.nca", "b.nca"]);
    }

    #[test]
    fn unterminated_name_is_an_error() {
        let table = StringTable::from_raw(b"abc".to_vec());
        assert!(table.get(0).is_none());
        assert!(table.name_at(0).is_err());
        assert!(table.name_at(10).is_err());
    }
}
