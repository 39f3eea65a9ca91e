//! RomFS, the read-only hierarchical filesystem found in NCA data sections.
//!
//! Directory and file records live in two metadata tables and link to each other by
//! their byte offset inside the respective table, `0xFFFFFFFF` meaning "none". The
//! root directory is always the record at offset 0.

use crate::{
    containers::{FileSystem, FsFile},
    error::{BoundsError, FormatError},
    storage::{FromStorage, Storage},
    HacResult,
};

use alloc::{
    collections::{BTreeMap, BTreeSet},
    format,
    vec::Vec,
};
use binrw::{io::Cursor, BinRead};
use bstr::{BStr, BString, ByteSlice};
use core::fmt;

pub const ROMFS_ENTRY_EMPTY: u32 = 0xffff_ffff;

/// Deepest directory nesting accepted before the image is treated as corrupted.
pub const MAX_DEPTH: usize = 256;

const MAX_NAME_SIZE: u32 = 0x300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum RomFsError {
    #[error("{table} record at 0x{offset:x} is reached twice")]
    Cycle { table: &'static str, offset: u32 },

    #[error("directories are nested deeper than {depth}")]
    TooDeep { depth: usize },

    #[error("{table} record at 0x{offset:x} does not exist")]
    MissingEntry { table: &'static str, offset: u32 },

    #[error("file {path:?} at 0x{offset:x}+0x{size:x} exceeds the 0x{limit:x} byte image")]
    FileOutOfBounds {
        path: BString,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("no file at {path:?}")]
    NotFound { path: BString },
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Default)]
pub struct RomFsHeader {
    pub header_size: u64,
    pub dir_hash_table_offset: u64,
    pub dir_hash_table_size: u64,
    pub dir_meta_table_offset: u64,
    pub dir_meta_table_size: u64,
    pub file_hash_table_offset: u64,
    pub file_hash_table_size: u64,
    pub file_meta_table_offset: u64,
    pub file_meta_table_size: u64,
    pub data_offset: u64,
}

impl RomFsHeader {
    pub const SIZE: u64 = 0x50;
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub parent: u32,
    pub sibling: u32,
    pub child: u32,
    pub file: u32,
    pub hash: u32,

    #[br(temp, assert(name_size <= MAX_NAME_SIZE))]
    #[bw(calc = name.len() as u32)]
    name_size: u32,

    #[br(count = name_size, map = |v: Vec<u8>| BString::from(v))]
    #[bw(map = |n: &BString| n.to_vec())]
    #[brw(align_after = 4)]
    pub name: BString,
}

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub parent: u32,
    pub sibling: u32,
    /// relative to the data region
    pub offset: u64,
    pub size: u64,
    pub hash: u32,

    #[br(temp, assert(name_size <= MAX_NAME_SIZE))]
    #[bw(calc = name.len() as u32)]
    name_size: u32,

    #[br(count = name_size, map = |v: Vec<u8>| BString::from(v))]
    #[bw(map = |n: &BString| n.to_vec())]
    #[brw(align_after = 4)]
    pub name: BString,
}

/// A file found while walking the tree, `offset` is relative to the start of the RomFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomFsFile {
    pub path: BString,
    pub offset: u64,
    pub size: u64,
}

fn read_table<T>(storage: &Storage, offset: u64, size: u64, what: &str) -> HacResult<BTreeMap<u32, T>>
where
    T: for<'a> BinRead<Args<'a> = ()> + binrw::meta::ReadEndian,
{
    BoundsError::check(|| format!("romfs {what} table"), offset, size, storage.length()?)?;

    let raw = storage.read_vec(offset, size as usize)?;
    let mut cursor = Cursor::new(&raw[..]);
    let mut entries = BTreeMap::new();

    while (cursor.position() as usize) < raw.len() {
        let record_offset = cursor.position() as u32;
        entries.insert(record_offset, T::read(&mut cursor)?);
    }

    Ok(entries)
}

fn join(parent: &BStr, name: &BStr) -> BString {
    if parent.is_empty() {
        return name.into();
    }

    let mut path = BString::from(parent);
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

#[derive(Clone)]
pub struct RomFs {
    storage: Storage,
    header: RomFsHeader,
    directories: BTreeMap<u32, DirEntry>,
    files: BTreeMap<u32, FileEntry>,
    paths: Vec<RomFsFile>,
    dir_paths: Vec<BString>,
}

impl RomFs {
    pub fn open(storage: Storage) -> HacResult<Self> {
        let header = RomFsHeader::read_le(&mut storage.clone().into_stdio())?;
        if header.header_size != RomFsHeader::SIZE {
            return Err(FormatError::Corrupted {
                what: "romfs header",
                reason: format!("header size is 0x{:x}", header.header_size),
            }
            .into());
        }

        let directories = read_table::<DirEntry>(
            &storage,
            header.dir_meta_table_offset,
            header.dir_meta_table_size,
            "directory",
        )?;
        let files = read_table::<FileEntry>(
            &storage,
            header.file_meta_table_offset,
            header.file_meta_table_size,
            "file",
        )?;

        let mut romfs = Self {
            storage,
            header,
            directories,
            files,
            paths: Vec::new(),
            dir_paths: Vec::new(),
        };

        let (paths, dir_paths) = romfs.walk()?;
        romfs.paths = paths;
        romfs.dir_paths = dir_paths;

        log::debug!(
            "parsed romfs with {} directories and {} files",
            romfs.directories.len(),
            romfs.files.len()
        );

        Ok(romfs)
    }

    fn dir(&self, offset: u32) -> Result<&DirEntry, RomFsError> {
        self.directories
            .get(&offset)
            .ok_or(RomFsError::MissingEntry {
                table: "directory",
                offset,
            })
    }

    fn file(&self, offset: u32) -> Result<&FileEntry, RomFsError> {
        self.files.get(&offset).ok_or(RomFsError::MissingEntry {
            table: "file",
            offset,
        })
    }

    /// Walks the tree from the root with an explicit stack. Every record may only be
    /// reached once, which rules out cycles in both the sibling and the child links.
    fn walk(&self) -> Result<(Vec<RomFsFile>, Vec<BString>), RomFsError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();

        let mut seen_dirs = BTreeSet::from([0u32]);
        let mut seen_files = BTreeSet::new();
        let mut stack = alloc::vec![(0u32, BString::default(), 0usize)];

        while let Some((dir_offset, path, depth)) = stack.pop() {
            let dir = self.dir(dir_offset)?;

            let mut next = dir.file;
            while next != ROMFS_ENTRY_EMPTY {
                if !seen_files.insert(next) {
                    return Err(RomFsError::Cycle {
                        table: "file",
                        offset: next,
                    });
                }

                let file = self.file(next)?;
                files.push(RomFsFile {
                    path: join(path.as_bstr(), file.name.as_bstr()),
                    offset: self.header.data_offset.saturating_add(file.offset),
                    size: file.size,
                });
                next = file.sibling;
            }

            let mut next = dir.child;
            while next != ROMFS_ENTRY_EMPTY {
                if !seen_dirs.insert(next) {
                    return Err(RomFsError::Cycle {
                        table: "directory",
                        offset: next,
                    });
                }
                if depth + 1 > MAX_DEPTH {
                    return Err(RomFsError::TooDeep { depth: MAX_DEPTH });
                }

                let child = self.dir(next)?;
                let child_path = join(path.as_bstr(), child.name.as_bstr());
                dirs.push(child_path.clone());
                stack.push((next, child_path, depth + 1));
                next = child.sibling;
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        dirs.sort();

        Ok((files, dirs))
    }

    pub fn header(&self) -> &RomFsHeader {
        &self.header
    }

    /// Every file with its full `/` separated path, sorted by path.
    pub fn files(&self) -> &[RomFsFile] {
        &self.paths
    }

    /// Every directory below the root, sorted by path.
    pub fn directories(&self) -> &[BString] {
        &self.dir_paths
    }

    pub fn open_file(&self, path: impl AsRef<[u8]>) -> Option<&RomFsFile> {
        let path = path.as_ref();
        let path = path.strip_prefix(b"/").unwrap_or(path);
        self.paths.iter().find(|f| f.path == path)
    }

    /// Opens the data of the file at `path`, a leading `/` is optional.
    pub fn open_path(&self, path: impl AsRef<[u8]>) -> HacResult<Storage> {
        let file = self.open_file(path.as_ref()).ok_or_else(|| RomFsError::NotFound {
            path: path.as_ref().into(),
        })?;
        self.file_data(file)
    }

    pub fn file_data(&self, file: &RomFsFile) -> HacResult<Storage> {
        let limit = self.storage.length()?;
        match file.offset.checked_add(file.size) {
            Some(end) if end <= limit => {}
            _ => {
                return Err(RomFsError::FileOutOfBounds {
                    path: file.path.clone(),
                    offset: file.offset,
                    size: file.size,
                    limit,
                }
                .into())
            }
        }

        Ok(self.storage.clone().split(file.offset, file.size)?)
    }
}

impl fmt::Debug for RomFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RomFs")
            .field("directories", &self.dir_paths.len())
            .field("files", &self.paths.len())
            .finish()
    }
}

impl FromStorage for RomFs {
    type Args = ();

    fn from_storage(parent: Storage, _: Self::Args) -> HacResult<Self> {
        RomFs::open(parent)
    }
}

impl FileSystem for RomFs {
    fn fs_name(&self) -> &'static str {
        "RomFS"
    }

    fn all_files(&self) -> HacResult<Vec<FsFile>> {
        self.paths
            .iter()
            .map(|f| {
                Ok(FsFile {
                    path: f.path.clone(),
                    data: self.file_data(f)?,
                })
            })
            .collect()
    }
}
