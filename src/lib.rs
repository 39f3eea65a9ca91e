#![cfg_attr(not(feature = "std"), no_std)]
#![deny(clippy::unwrap_used)]

extern crate alloc;

pub mod common;
pub mod containers;
pub mod error;
pub mod keyset;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{ErrorKind, HacError, HacResult};

pub mod prelude {
    pub use super::{
        containers::{
            nca::{Nca, NcaSection, SectionContent},
            partitionfs::{hfs0::Hfs0, pfs0::Pfs0, PartitionFsMode},
            romfs::RomFs,
            xci::Xci,
            FileSystem,
        },
        keyset::KeyTable,
        storage::{FromStorage, IStorage, Storage, VecStorage},
        HacError, HacResult,
    };
}

#[cfg(feature = "std")]
pub(crate) use parking_lot as sync_impl;

#[cfg(not(feature = "std"))]
pub(crate) use spin as sync_impl;
