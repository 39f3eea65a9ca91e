//! PFS0 and HFS0, the two flat partition formats.
//!
//! Both share the same layout: a 16 byte header, the file table, a string table with
//! the null terminated names and finally the file data, with entry offsets relative
//! to the end of the string table. They only differ in magic and entry size.

pub mod hfs0;
pub mod pfs0;

use crate::{
    containers::{FileSystem, FsFile},
    error::BoundsError,
    storage::{FromStorage, Storage},
    utils::{check_magic, sealed::Sealed, string_table::StringTable},
    HacResult,
};

use alloc::{collections::BTreeSet, format, vec::Vec};
use binrw::meta::ReadEndian;
use binrw::{BinRead, BinWrite};
use bstr::{BStr, BString};
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum PartitionFsError {
    #[error("entry {name:?} at 0x{offset:x}+0x{size:x} exceeds the 0x{limit:x} byte payload")]
    EntryOutOfBounds {
        name: BString,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("file name {name:?} appears more than once")]
    DuplicateName { name: BString },

    #[error("partition was parsed metadata only, data of {name:?} is not available")]
    NotMaterialized { name: BString },
}

/// How much of a partition to set up while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionFsMode {
    /// Validate every entry and expose its data as a storage.
    #[default]
    Materialize,
    /// Only read the header. Used for container maps where the payload is not
    /// contiguous with (or not even part of) the storage the header lives in.
    MetadataOnly,
}

pub trait EntryLike: Sealed + fmt::Debug + Clone {
    fn string_offset(&self) -> u32;
    fn size(&self) -> u64;
    fn offset(&self) -> u64;

    fn hash(&self) -> Option<&[u8; 0x20]> {
        None
    }

    fn hashed_size(&self) -> Option<u32> {
        None
    }
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
struct CommonHeader<E>
where
    E: BinRead + BinWrite + 'static,
    E: for<'a> BinRead<Args<'a> = ()>,
    E: for<'a> BinWrite<Args<'a> = ()>,
{
    #[br(temp)]
    #[bw(calc = entries.len() as u32)]
    entry_cnt: u32,

    #[br(temp)]
    #[bw(calc = string_table.as_bytes().len() as u32)]
    string_table_size: u32,

    reserved: u32,

    #[br(count = entry_cnt)]
    entries: Vec<E>,

    #[br(args(string_table_size as usize))]
    string_table: StringTable,
}

impl<E> CommonHeader<E>
where
    E: BinRead + BinWrite + 'static,
    E: for<'a> BinRead<Args<'a> = ()>,
    E: for<'a> BinWrite<Args<'a> = ()>,
{
    const STATIC_HDR_SIZE: usize = 0x4 + 0x4 + 0x4 + 0x4;

    fn size(&self, entry_size: usize) -> usize {
        Self::STATIC_HDR_SIZE + self.entries.len() * entry_size + self.string_table.len()
    }
}

pub trait HeaderLike: Sealed + fmt::Debug
where
    Self: BinRead + BinWrite + ReadEndian + 'static,
    Self: for<'a> BinRead<Args<'a> = ()>,
    Self: for<'a> BinWrite<Args<'a> = ()>,
{
    const MAGIC: &'static [u8; 4];
    const NAME: &'static str;

    type RawEntry: EntryLike;

    /// Size of the header including file and string table, the start of the file data.
    fn size(&self) -> usize;

    fn entries(&self) -> &[Self::RawEntry];

    fn string_table(&self) -> &StringTable;
}

pub struct Entry<'a, H: HeaderLike> {
    parent: &'a PartitionFs<H>,
    raw: &'a H::RawEntry,
}

impl<'a, H: HeaderLike> Entry<'a, H> {
    pub fn name(&self) -> &'a BStr {
        // every name was validated while parsing
        self.parent
            .hdr
            .string_table()
            .get(self.raw.string_offset() as usize)
            .unwrap_or_default()
    }

    /// Offset relative to the start of the file data.
    pub fn offset(&self) -> u64 {
        self.raw.offset()
    }

    pub fn size(&self) -> u64 {
        self.raw.size()
    }

    pub fn hash(&self) -> Option<&'a [u8; 0x20]> {
        self.raw.hash()
    }

    pub fn hashed_size(&self) -> Option<u32> {
        self.raw.hashed_size()
    }

    pub fn raw(&self) -> &'a H::RawEntry {
        self.raw
    }

    pub fn data(&self) -> HacResult<Storage> {
        let Some(data) = &self.parent.data else {
            return Err(PartitionFsError::NotMaterialized {
                name: self.name().into(),
            }
            .into());
        };

        Ok(data.clone().split(self.raw.offset(), self.raw.size())?)
    }
}

impl<'a, H: HeaderLike> fmt::Debug for Entry<'a, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name())
            .field("raw", &self.raw)
            .finish()
    }
}

pub struct PartitionFs<H: HeaderLike> {
    hdr: H,
    mode: PartitionFsMode,
    data: Option<Storage>,
}

impl<H: HeaderLike> PartitionFs<H> {
    pub fn open(parent: Storage, mode: PartitionFsMode) -> HacResult<Self> {
        check_magic(&parent, 0, H::MAGIC)?;

        let hdr = H::read(&mut parent.clone().into_stdio())?;
        let hdr_size = hdr.size() as u64;
        let parent_len = parent.length()?;
        BoundsError::check(
            || format!("{} header", BStr::new(H::MAGIC)),
            0,
            hdr_size,
            parent_len,
        )?;

        for raw in hdr.entries() {
            hdr.string_table()
                .name_at(raw.string_offset() as usize)?;
        }

        let data = match mode {
            PartitionFsMode::MetadataOnly => None,
            PartitionFsMode::Materialize => {
                let limit = parent_len - hdr_size;
                let mut seen = BTreeSet::new();

                for raw in hdr.entries() {
                    let name = hdr.string_table().name_at(raw.string_offset() as usize)?;

                    if raw
                        .offset()
                        .checked_add(raw.size())
                        .map_or(true, |end| end > limit)
                    {
                        return Err(PartitionFsError::EntryOutOfBounds {
                            name: name.into(),
                            offset: raw.offset(),
                            size: raw.size(),
                            limit,
                        }
                        .into());
                    }

                    if !seen.insert(name) {
                        return Err(PartitionFsError::DuplicateName { name: name.into() }.into());
                    }
                }

                Some(parent.split(hdr_size, limit)?)
            }
        };

        log::debug!(
            "parsed {} with {} entries",
            BStr::new(H::MAGIC),
            hdr.entries().len()
        );

        Ok(Self { hdr, mode, data })
    }

    pub fn header(&self) -> &H {
        &self.hdr
    }

    pub fn magic(&self) -> &'static BStr {
        BStr::new(H::MAGIC)
    }

    pub fn mode(&self) -> PartitionFsMode {
        self.mode
    }

    pub fn header_size(&self) -> u64 {
        self.hdr.size() as u64
    }

    pub fn len(&self) -> usize {
        self.hdr.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdr.entries().is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &BStr> {
        self.files().map(|e| e.name())
    }

    pub fn files(&self) -> impl Iterator<Item = Entry<'_, H>> {
        self.hdr.entries().iter().map(|raw| Entry { parent: self, raw })
    }

    pub fn find(&self, name: impl AsRef<[u8]>) -> Option<Entry<'_, H>> {
        let name = name.as_ref();
        self.files().find(|e| e.name() == name)
    }
}

impl<H: HeaderLike> fmt::Debug for PartitionFs<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionFs")
            .field("magic", &self.magic())
            .field("mode", &self.mode)
            .field("files", &self.files().collect::<Vec<_>>())
            .finish()
    }
}

impl<H: HeaderLike> FromStorage for PartitionFs<H> {
    type Args = PartitionFsMode;

    fn from_storage(parent: Storage, mode: Self::Args) -> HacResult<Self> {
        PartitionFs::open(parent, mode)
    }
}

impl<H: HeaderLike> FileSystem for PartitionFs<H> {
    fn all_files(&self) -> HacResult<Vec<FsFile>> {
        self.files()
            .map(|e| {
                Ok(FsFile {
                    path: e.name().into(),
                    data: e.data()?,
                })
            })
            .collect()
    }

    fn fs_name(&self) -> &'static str {
        H::NAME
    }
}
