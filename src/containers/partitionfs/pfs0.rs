use crate::utils::{sealed::Sealed, string_table::StringTable};

use super::{CommonHeader, EntryLike, HeaderLike};

/// 0x18 byte file entry, the data offset is relative to the end of the header.
#[derive(Debug, Copy, Clone)]
#[binrw::binrw]
#[brw(little)]
pub struct RawPfs0Entry {
    pub offset: u64,
    pub size: u64,
    #[brw(pad_after = 4)]
    pub string_offset: u32,
}

impl RawPfs0Entry {
    pub const SIZE: usize = 0x18;
}

impl Sealed for RawPfs0Entry {}
impl EntryLike for RawPfs0Entry {
    fn string_offset(&self) -> u32 {
        self.string_offset
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[binrw::binrw]
#[brw(magic = b"PFS0", little)]
#[derive(Debug, Clone)]
pub struct Pfs0Header(CommonHeader<RawPfs0Entry>);

impl Sealed for Pfs0Header {}
impl HeaderLike for Pfs0Header {
    const MAGIC: &'static [u8; 4] = b"PFS0";
    const NAME: &'static str = "PFS0";

    type RawEntry = RawPfs0Entry;

    fn entries(&self) -> &[RawPfs0Entry] {
        &self.0.entries
    }

    fn size(&self) -> usize {
        self.0.size(RawPfs0Entry::SIZE)
    }

    fn string_table(&self) -> &StringTable {
        &self.0.string_table
    }
}

/// The flat filesystem of NSPs and of NCA ExeFS/logo sections.
pub type Pfs0 = super::PartitionFs<Pfs0Header>;

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::{io::Cursor, BinRead};

    #[test]
    fn entry_layout() {
        let mut raw = [0u8; RawPfs0Entry::SIZE];
        raw[..8].copy_from_slice(&0x40u64.to_le_bytes());
        raw[8..0x10].copy_from_slice(&0x123u64.to_le_bytes());
        raw[0x10..0x14].copy_from_slice(&5u32.to_le_bytes());
        raw[0x14..].fill(0xff);

        let mut cursor = Cursor::new(&raw[..]);
        let entry = RawPfs0Entry::read(&mut cursor).unwrap();
        assert_eq!((entry.offset, entry.size, entry.string_offset), (0x40, 0x123, 5));
        assert_eq!(cursor.position(), RawPfs0Entry::SIZE as u64);
    }
}
