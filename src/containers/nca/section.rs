use alloc::{format, string::String, sync::Arc, vec::Vec};
use binrw::{io::Cursor, BinRead};
use core::fmt;

use crate::{
    containers::{
        partitionfs::{pfs0::Pfs0, PartitionFsMode},
        romfs::RomFs,
        FileSystem, FsFile,
    },
    error::{BoundsError, FormatError},
    keyset::KeyError,
    storage::{
        crypto::{
            AesCtrStorage, AesXtsStorage, AlignedCtrStorage, AlignedXtsStorage, CtrCodec,
            XtsCodec,
        },
        Storage,
    },
    utils::HexArray,
    HacResult,
};

use super::NcaError;

pub const IVFC_MAX_LEVEL: usize = 6;

/// How the data of a section is encrypted, decoded from the raw fs header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionCrypto {
    None,
    Xts,
    Ctr,
    /// AES-CTR-EX, used by update (patch) sections. Never decrypted.
    Bktr,
    Unknown(u8),
}

impl SectionCrypto {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SectionCrypto::None,
            2 => SectionCrypto::Xts,
            // 5 is plain ctr with the layer hash skipped (14.0.0+)
            3 | 5 => SectionCrypto::Ctr,
            4 | 6 => SectionCrypto::Bktr,
            other => SectionCrypto::Unknown(other),
        }
    }
}

impl fmt::Display for SectionCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionCrypto::None => write!(f, "None"),
            SectionCrypto::Xts => write!(f, "AES-XTS"),
            SectionCrypto::Ctr => write!(f, "AES-CTR"),
            SectionCrypto::Bktr => write!(f, "BKTR"),
            SectionCrypto::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// hierarchical sha256, the section holds a PFS0
    HierarchicalSha256,
    /// ivfc, the section holds a RomFS
    HierarchicalIntegrity,
    Other(u8),
}

impl HashType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            2 => HashType::HierarchicalSha256,
            3 => HashType::HierarchicalIntegrity,
            other => HashType::Other(other),
        }
    }
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct Pfs0Superblock {
    pub master_hash: HexArray<0x20>,
    pub block_size: u32,
    pub always_2: u32,
    pub hash_table_offset: u64,
    pub hash_table_size: u64,
    pub pfs0_offset: u64,
    pub pfs0_size: u64,
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy)]
pub struct IvfcLevel {
    pub logical_offset: u64,
    pub hash_data_size: u64,
    pub block_size: u32,
    pub reserved: u32,
}

#[binrw::binrw]
#[brw(little, magic = b"IVFC")]
#[derive(Debug, Clone)]
pub struct IvfcSuperblock {
    pub id: u32,
    pub master_hash_size: u32,
    pub num_levels: u32,
    pub levels: [IvfcLevel; IVFC_MAX_LEVEL],
    reserved: HexArray<0x20>,
    pub master_hash: HexArray<0x20>,
}

impl IvfcSuperblock {
    /// The last level is the actual RomFS image.
    pub fn romfs_level(&self) -> &IvfcLevel {
        &self.levels[IVFC_MAX_LEVEL - 1]
    }
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct FsHeader {
    pub version: u16,
    pub fs_type: u8,
    pub hash_type: u8,
    pub encryption_type: u8,
    pub metadata_hash_type: u8,
    reserved0: HexArray<2>,
    pub superblock: HexArray<0x138>,
    /// upper half of the section's CTR counter
    pub ctr_seed: u64,
    sparse_info: HexArray<0x30>,
    compression_info: HexArray<0x28>,   // 12.0.0+
    metadata_hash_info: HexArray<0x30>, // 14.0.0+
    reserved1: HexArray<0x30>,
}

impl FsHeader {
    pub fn crypto(&self) -> SectionCrypto {
        SectionCrypto::from_raw(self.encryption_type)
    }

    pub fn hash(&self) -> HashType {
        HashType::from_raw(self.hash_type)
    }

    pub fn pfs0_superblock(&self) -> HacResult<Pfs0Superblock> {
        Ok(Pfs0Superblock::read(&mut Cursor::new(&self.superblock.0[..]))?)
    }

    pub fn ivfc_superblock(&self) -> HacResult<IvfcSuperblock> {
        Ok(IvfcSuperblock::read(&mut Cursor::new(&self.superblock.0[..]))?)
    }

    /// The seed in the byte order it takes up in the counter.
    pub fn ctr_seed_bytes(&self) -> [u8; 8] {
        self.ctr_seed.to_be_bytes()
    }

    /// Initial tweak of an XTS section: the seed followed by zeros.
    pub fn xts_initial_tweak(&self) -> [u8; 0x10] {
        let mut tweak = [0; 0x10];
        tweak[..8].copy_from_slice(&self.ctr_seed_bytes());
        tweak
    }
}

/// Something a caller must know about data it got from a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionWarning {
    /// patch section crypto is not implemented, the bytes are still encrypted
    RawBktrData { index: usize },
    /// the section could not be opened, its siblings are unaffected
    Skipped { index: usize, reason: String },
}

impl fmt::Display for SectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionWarning::RawBktrData { index } => {
                write!(f, "section {index} uses BKTR crypto, returned data is raw ciphertext")
            }
            SectionWarning::Skipped { index, reason } => {
                write!(f, "section {index} skipped: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionRead {
    pub data: Vec<u8>,
    pub warning: Option<SectionWarning>,
}

#[derive(Debug, Clone)]
pub struct UnsupportedContent {
    pub reason: String,
}

impl FileSystem for UnsupportedContent {
    fn all_files(&self) -> HacResult<Vec<FsFile>> {
        Err(FormatError::Unsupported(self.reason.clone()).into())
    }

    fn fs_name(&self) -> &'static str {
        "unsupported"
    }
}

/// What a section turned out to contain, decided once from its fs header.
#[enum_dispatch::enum_dispatch(FileSystem)]
#[derive(Debug)]
pub enum SectionContent {
    Flat(Pfs0),
    Hierarchical(RomFs),
    Unsupported(UnsupportedContent),
}

pub struct NcaSection {
    pub(crate) index: usize,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) fs_header: Arc<FsHeader>,
    /// the whole nca, sections are split out of it before any crypto is applied
    pub(crate) nca_storage: Storage,
    pub(crate) keys: Result<[[u8; 0x10]; 4], KeyError>,
}

impl NcaSection {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the section in the NCA.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn header(&self) -> &FsHeader {
        &self.fs_header
    }

    pub fn crypto(&self) -> SectionCrypto {
        self.fs_header.crypto()
    }

    pub fn open_encrypted(&self) -> HacResult<Storage> {
        Ok(self.nca_storage.clone().split(self.offset, self.size)?)
    }

    fn keys(&self) -> Result<&[[u8; 0x10]; 4], KeyError> {
        self.keys.as_ref().map_err(Clone::clone)
    }

    /// CTR key is `key[i]`.
    fn ctr_codec(&self) -> Result<CtrCodec, KeyError> {
        Ok(CtrCodec::new(
            self.keys()?[self.index],
            self.fs_header.ctr_seed_bytes(),
        ))
    }

    /// XTS uses `key[i]` as data key and `key[i + 2]` as tweak key, so only the
    /// first two sections can be XTS encrypted.
    fn xts_codec(&self) -> Result<XtsCodec, KeyError> {
        let keys = self.keys()?;
        let tweak_key = keys
            .get(self.index + 2)
            .ok_or(KeyError::NoXtsKeyForSection { index: self.index })?;
        Ok(XtsCodec::from_halves(&keys[self.index], tweak_key))
    }

    /// A storage of the plaintext section data.
    pub fn open_decrypted(&self) -> HacResult<Storage> {
        match self.crypto() {
            SectionCrypto::None => self.open_encrypted(),
            // the counter starts at 0 at the beginning of the section
            SectionCrypto::Ctr => Ok(AlignedCtrStorage::wrap(AesCtrStorage::new(
                self.open_encrypted()?,
                self.ctr_codec()?,
            ))),
            SectionCrypto::Xts => Ok(AlignedXtsStorage::wrap(AesXtsStorage::new(
                self.open_encrypted()?,
                self.xts_codec()?,
                self.fs_header.xts_initial_tweak(),
            ))),
            SectionCrypto::Bktr => Err(NcaError::BktrUnsupported { index: self.index }.into()),
            SectionCrypto::Unknown(raw) => Err(NcaError::UnknownEncryption {
                index: self.index,
                raw,
            }
            .into()),
        }
    }

    /// Reads `size` bytes at `offset` (relative to the section start) in plaintext.
    ///
    /// BKTR sections are returned as they are on disk together with a warning.
    pub fn read(&self, offset: u64, size: usize) -> HacResult<SectionRead> {
        BoundsError::check(
            || format!("section {}", self.index),
            offset,
            size as u64,
            self.size,
        )?;

        if self.crypto() == SectionCrypto::Bktr {
            let warning = SectionWarning::RawBktrData { index: self.index };
            log::warn!("{warning}");
            return Ok(SectionRead {
                data: self.open_encrypted()?.read_vec(offset, size)?,
                warning: Some(warning),
            });
        }

        Ok(SectionRead {
            data: self.open_decrypted()?.read_vec(offset, size)?,
            warning: None,
        })
    }

    /// Parses the filesystem inside the section.
    pub fn content(&self) -> HacResult<SectionContent> {
        if self.crypto() == SectionCrypto::Bktr {
            return Ok(UnsupportedContent {
                reason: format!("section {} is a BKTR patch section", self.index),
            }
            .into());
        }

        match self.fs_header.hash() {
            HashType::HierarchicalSha256 => {
                let sb = self.fs_header.pfs0_superblock()?;
                let storage = self.open_decrypted()?.split(sb.pfs0_offset, sb.pfs0_size)?;
                Ok(Pfs0::open(storage, PartitionFsMode::Materialize)?.into())
            }
            HashType::HierarchicalIntegrity => {
                let sb = self.fs_header.ivfc_superblock()?;
                let level = sb.romfs_level();
                let storage = self
                    .open_decrypted()?
                    .split(level.logical_offset, level.hash_data_size)?;
                Ok(RomFs::open(storage)?.into())
            }
            HashType::Other(raw) => Ok(UnsupportedContent {
                reason: format!("section {} has hash type {raw}", self.index),
            }
            .into()),
        }
    }
}

impl fmt::Debug for NcaSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NcaSection")
            .field("index", &self.index)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("crypto", &self.crypto())
            .finish()
    }
}
