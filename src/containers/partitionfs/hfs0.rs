use crate::utils::sealed::Sealed;
use crate::utils::string_table::StringTable;
use crate::utils::HexArray;

use super::{CommonHeader, EntryLike, HeaderLike};

/// PFS0 entry plus the size and SHA-256 of the hashed region at the start of the file.
#[derive(Debug, Copy, Clone)]
#[binrw::binrw]
#[brw(little)]
pub struct RawHfs0Entry {
    offset: u64,
    size: u64,
    string_offset: u32,
    hashed_size: u32,
    reserved: u64,
    hash: HexArray<0x20>,
}

impl RawHfs0Entry {
    pub const SIZE: usize = 0x40;
}

impl Sealed for RawHfs0Entry {}
impl EntryLike for RawHfs0Entry {
    fn size(&self) -> u64 {
        self.size
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn string_offset(&self) -> u32 {
        self.string_offset
    }

    fn hash(&self) -> Option<&[u8; 0x20]> {
        Some(&self.hash.0)
    }

    fn hashed_size(&self) -> Option<u32> {
        Some(self.hashed_size)
    }
}

#[binrw::binrw]
#[brw(magic = b"HFS0", little)]
#[derive(Debug, Clone)]
pub struct Hfs0Header(CommonHeader<RawHfs0Entry>);

impl Sealed for Hfs0Header {}
impl HeaderLike for Hfs0Header {
    const MAGIC: &'static [u8; 4] = b"HFS0";
    const NAME: &'static str = "HFS0";

    type RawEntry = RawHfs0Entry;

    fn entries(&self) -> &[Self::RawEntry] {
        &self.0.entries
    }

    fn size(&self) -> usize {
        self.0.size(RawHfs0Entry::SIZE)
    }

    fn string_table(&self) -> &StringTable {
        &self.0.string_table
    }
}

/// The flat filesystem used for game card partitions.
pub type Hfs0 = super::PartitionFs<Hfs0Header>;
