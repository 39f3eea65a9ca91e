//! Game card images.
//!
//! An XCI starts with a 0x200 byte card header pointing at the root HFS0. The root
//! only serves as a map: each of its entries is itself an HFS0 partition (update,
//! normal, secure, logo) whose offset is relative to the end of the root header.

use crate::{
    containers::partitionfs::{hfs0::Hfs0, PartitionFsMode},
    storage::{FromStorage, Storage},
    utils::{check_magic, HexArray},
    HacResult,
};

use alloc::{string::String, vec::Vec};
use binrw::{io::Cursor, BinRead};
use bstr::ByteSlice;
use core::fmt;

pub const XCI_HEADER_SIZE: u64 = 0x200;

const PARTITION_NAMES: [&str; 4] = ["update", "normal", "secure", "logo"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum XciError {
    #[error("root partition has offset 0x{offset:x} and size 0x{size:x}")]
    EmptyRootPartition { offset: u64, size: u64 },
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct XciHeader {
    pub signature: HexArray<0x100>,
    #[brw(magic = b"HEAD")]
    pub secure_area_start: u32,
    pub backup_area_start: u32,
    pub kek_index: u8,
    pub cart_type: u8,
    pub header_version: u8,
    pub flags: u8,
    pub package_id: u64,
    pub raw_cart_size: u64,
    pub reversed_iv: HexArray<0x10>,
    pub hfs0_offset: u64,
    pub hfs0_header_size: u64,
    pub hfs0_header_hash: HexArray<0x20>,
    pub initial_data_hash: HexArray<0x20>,
    pub sel_sec: u32,
    pub sel_t1_key: u32,
    pub sel_key: u32,
    pub lim_area: u32,
    pub encrypted_data: HexArray<0x70>,
}

impl XciHeader {
    pub fn cart_type_name(&self) -> Option<&'static str> {
        Some(match self.cart_type {
            0xfa => "1GB",
            0xf8 => "2GB",
            0xf0 => "4GB",
            0xe0 => "8GB",
            0xe1 => "16GB",
            0xe2 => "32GB",
            _ => return None,
        })
    }

    /// End of the valid data on the card in bytes.
    pub fn cart_size(&self) -> u64 {
        self.raw_cart_size.saturating_add(1).saturating_mul(0x200)
    }

    /// The header IV, which is stored byte reversed.
    pub fn iv(&self) -> [u8; 0x10] {
        let mut iv = self.reversed_iv.0;
        iv.reverse();
        iv
    }
}

pub struct XciPartition {
    name: String,
    offset: u64,
    size: u64,
    storage: Storage,
    fs: Hfs0,
}

impl XciPartition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute offset in the card image.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn fs(&self) -> &Hfs0 {
        &self.fs
    }
}

impl fmt::Debug for XciPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XciPartition")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("fs", &self.fs)
            .finish()
    }
}

/// A partition that could not be opened, the card itself stays usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionWarning {
    pub name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct Xci {
    header: XciHeader,
    partitions: Vec<XciPartition>,
    warnings: Vec<PartitionWarning>,
}

fn normalize_partition_name(name: &[u8]) -> String {
    let name = name.to_str_lossy().to_lowercase();
    match name.strip_suffix(".hfs0") {
        Some(stripped) => stripped.into(),
        None => name,
    }
}

impl Xci {
    fn open_partition(storage: &Storage, offset: u64, size: u64) -> HacResult<(Storage, Hfs0)> {
        let partition = storage.clone().split(offset, size)?;
        let fs = Hfs0::open(partition.clone(), PartitionFsMode::Materialize)?;
        Ok((partition, fs))
    }

    pub fn open(storage: Storage) -> HacResult<Self> {
        check_magic(&storage, 0x100, b"HEAD")?;
        let raw = storage.read_vec(0, XCI_HEADER_SIZE as usize)?;
        let header = XciHeader::read(&mut Cursor::new(&raw[..]))?;

        let root_offset = header.hfs0_offset;
        let root_size = header.hfs0_header_size;
        if root_offset == 0 || root_size == 0 {
            return Err(XciError::EmptyRootPartition {
                offset: root_offset,
                size: root_size,
            }
            .into());
        }

        let root_storage = storage.clone().split(root_offset, root_size)?;
        let root = Hfs0::open(root_storage.clone(), PartitionFsMode::MetadataOnly)?;
        let payload_start = root_offset.saturating_add(root.header_size());

        let mut partitions = Vec::new();
        let mut warnings = Vec::new();

        for entry in root.files() {
            let name = normalize_partition_name(entry.name());
            if !PARTITION_NAMES.contains(&name.as_str()) {
                log::debug!("ignoring unknown root entry {:?}", entry.name());
                continue;
            }
            if entry.size() == 0 {
                continue;
            }

            let offset = payload_start.saturating_add(entry.offset());
            let size = entry.size();

            match Self::open_partition(&storage, offset, size) {
                Ok((storage, fs)) => {
                    log::debug!("found {name} partition at 0x{offset:x} with {} files", fs.len());
                    partitions.push(XciPartition {
                        name,
                        offset,
                        size,
                        storage,
                        fs,
                    });
                }
                Err(e) => {
                    log::warn!("skipping {name} partition at 0x{offset:x}: {e}");
                    warnings.push(PartitionWarning {
                        name,
                        reason: alloc::format!("{e}"),
                    });
                }
            }
        }

        partitions.insert(
            0,
            XciPartition {
                name: "root".into(),
                offset: root_offset,
                size: root_size,
                storage: root_storage,
                fs: root,
            },
        );

        Ok(Self {
            header,
            partitions,
            warnings,
        })
    }

    pub fn header(&self) -> &XciHeader {
        &self.header
    }

    /// The root map first, then every partition that could be opened in on-disk order.
    pub fn partitions(&self) -> &[XciPartition] {
        &self.partitions
    }

    pub fn partition(&self, name: &str) -> Option<&XciPartition> {
        let name = normalize_partition_name(name.as_bytes());
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn warnings(&self) -> &[PartitionWarning] {
        &self.warnings
    }
}

impl FromStorage for Xci {
    type Args = ();

    fn from_storage(parent: Storage, _: Self::Args) -> HacResult<Self> {
        Xci::open(parent)
    }
}
