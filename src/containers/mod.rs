use alloc::vec::Vec;
use bstr::BString;

use crate::{storage::Storage, HacResult};

/// A file inside one of the filesystem containers, with its data as a storage window.
#[derive(Debug, Clone)]
pub struct FsFile {
    pub path: BString,
    pub data: Storage,
}

/// Common view over the filesystems a section can contain.
#[enum_dispatch::enum_dispatch]
pub trait FileSystem {
    /// Every file with its full path.
    fn all_files(&self) -> HacResult<Vec<FsFile>>;

    fn fs_name(&self) -> &'static str;
}

pub mod nca;
pub mod partitionfs;
pub mod romfs;
pub mod xci;
