use core::fmt;

use crate::{
    common::{ProgramId, RightsId},
    keyset::{KeyAreaKeyIndex, KeyError},
    utils::HexArray,
};

pub const NCA_HEADER_SIZE: usize = 0x400;
pub const FS_HEADER_SIZE: usize = 0x200;
pub const NCA_FULL_HEADER_SIZE: usize = NCA_HEADER_SIZE + 4 * FS_HEADER_SIZE;
pub const MEDIA_UNIT: u64 = 0x200;

/// The header magic, `NCA` followed by the format version digit.
#[binrw::binrw]
#[brw(little, magic = b"NCA")]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NcaVersion {
    #[brw(magic = b'0')]
    Nca0,
    #[brw(magic = b'2')]
    Nca2,
    #[brw(magic = b'3')]
    Nca3,
    Unknown(u8),
}

impl NcaVersion {
    /// Identifies the version from the 4 magic bytes, `None` if they don't start with `NCA`.
    pub fn detect(magic: &[u8]) -> Option<Self> {
        match magic {
            [b'N', b'C', b'A', digit, ..] => Some(match digit {
                b'0' => NcaVersion::Nca0,
                b'2' => NcaVersion::Nca2,
                b'3' => NcaVersion::Nca3,
                other => NcaVersion::Unknown(*other),
            }),
            _ => None,
        }
    }

    pub(crate) fn is_known(magic: &[u8]) -> bool {
        matches!(
            Self::detect(magic),
            Some(NcaVersion::Nca0 | NcaVersion::Nca2 | NcaVersion::Nca3)
        )
    }
}

impl fmt::Display for NcaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NcaVersion::Nca0 => write!(f, "NCA0"),
            NcaVersion::Nca2 => write!(f, "NCA2"),
            NcaVersion::Nca3 => write!(f, "NCA3"),
            NcaVersion::Unknown(d) => write!(f, "NCA{}", *d as char),
        }
    }
}

#[binrw::binrw]
#[brw(little, repr(u8))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionType {
    Download = 0x0,
    GameCard = 0x1,
}

#[binrw::binrw]
#[brw(little, repr(u8))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Program = 0x0,
    Meta = 0x1,
    Control = 0x2,
    Manual = 0x3,
    Data = 0x4,
    PublicData = 0x5,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentType::Program => "Program",
            ContentType::Meta => "Meta",
            ContentType::Control => "Control",
            ContentType::Manual => "Manual",
            ContentType::Data => "Data",
            ContentType::PublicData => "PublicData",
        })
    }
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NcaFsEntry {
    // in media units of 0x200 bytes
    pub start_offset_block: u32,
    pub end_offset_block: u32,
    pub flags: u32,
    pub reserved1: u32,
}

impl NcaFsEntry {
    /// A zero sized entry marks an absent section.
    pub fn is_present(&self) -> bool {
        self.end_offset_block > self.start_offset_block
    }

    pub fn offset(&self) -> u64 {
        self.start_offset_block as u64 * MEDIA_UNIT
    }

    pub fn size(&self) -> u64 {
        self.end_offset_block.saturating_sub(self.start_offset_block) as u64 * MEDIA_UNIT
    }
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy)]
pub struct SdkAddonVersion {
    _zero: u8,
    micro: u8,
    minor: u8,
    major: u8,
}

impl fmt::Display for SdkAddonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.micro, self._zero
        )
    }
}

/// The fixed 0x400 byte NCA header, after decryption.
#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct NcaHeader {
    pub fixed_key_hdr_signature: HexArray<0x100>,
    pub npdm_hdr_signature: HexArray<0x100>,
    pub magic: NcaVersion,
    pub distribution_type: DistributionType,
    pub content_type: ContentType,
    /// master key revision the key area is encrypted for
    pub key_revision: u8,
    /// raw key area key role, see [`NcaHeader::key_area_key_role`]
    pub key_area_key_index: u8,
    pub content_size: u64,
    pub program_id: ProgramId,
    pub content_index: u32,
    pub sdk_addon_version: SdkAddonVersion,
    pub key_generation: u8,
    pub signature_key_generation: u8, // 9.0.0+
    pub reserved: HexArray<0xe>,
    pub rights_id: RightsId,
    pub fs_entries: [NcaFsEntry; 4],
    pub fs_entry_hashes: [HexArray<0x20>; 4],
    #[brw(pad_after = 0xc0)]
    pub encrypted_key_area: [HexArray<0x10>; 4],
}

impl NcaHeader {
    /// Which key area key the key area is encrypted with. Only checked once the
    /// key area is needed, an unknown role does not stop the header from parsing.
    pub fn key_area_key_role(&self) -> Result<KeyAreaKeyIndex, KeyError> {
        KeyAreaKeyIndex::from_raw(self.key_area_key_index)
    }

    pub fn has_rights_id(&self) -> bool {
        !self.rights_id.is_empty()
    }
}
