//! Random access byte sources.
//!
//! Everything in this crate reads through a [`Storage`], a cheaply clonable handle to
//! some [`IStorage`]. Containers hand out [`SubStorage`] windows into their parent for
//! nested data and the [`crypto`] storages decrypt on the fly, so an XCI partition file
//! can be opened as an NCA whose section is then parsed as a PFS0 without copying.

use alloc::{sync::Arc, vec::Vec};
use core::fmt;

#[cfg(feature = "std")]
mod file;
#[cfg(feature = "std")]
pub use file::FileStorage;

use crate::HacResult;

pub mod crypto;
mod mapper;
mod memory;
mod stdio;
mod substorage;

pub use self::{
    mapper::FromStorage,
    memory::VecStorage,
    stdio::StorageStdioWrapper,
    substorage::{SubStorage, SubStorageError},
};

pub trait IStorage: fmt::Debug + Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`. Returns how many bytes were read,
    /// which is only less than requested when the end of the storage was hit.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64>;

    fn length(&self) -> HacResult<u64>;

    fn into_storage(self) -> Storage
    where
        Self: Sized + 'static,
    {
        Storage::new(self)
    }
}

#[derive(Clone)]
pub struct Storage(Arc<dyn IStorage>);

impl Storage {
    pub fn new(s: impl IStorage + 'static) -> Self {
        Self(Arc::new(s))
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        self.0.read_at(offset, buf)
    }

    pub fn length(&self) -> HacResult<u64> {
        self.0.length()
    }

    /// Fills `buf` completely or fails, a short read is never zero padded.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let cnt = self.read_at(offset + done as u64, &mut buf[done..])?;
            if cnt == 0 {
                return Err(binrw::io::Error::new(
                    binrw::io::ErrorKind::UnexpectedEof,
                    "short read from storage",
                )
                .into());
            }
            done += cnt as usize;
        }
        Ok(())
    }

    pub fn read_vec(&self, offset: u64, len: usize) -> HacResult<Vec<u8>> {
        let mut buf = alloc::vec![0; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Creates a window of `len` bytes at `offset` into this storage.
    pub fn split(self, offset: u64, len: u64) -> Result<Storage, SubStorageError> {
        SubStorage::split_from(self, offset, len)
    }

    pub fn into_stdio(self) -> StorageStdioWrapper {
        StorageStdioWrapper::new(self)
    }

    pub fn map_to_storage<T: FromStorage>(self, args: T::Args) -> HacResult<T> {
        T::from_storage(self, args)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn short_reads_are_errors() {
        let storage = VecStorage::new(vec![1, 2, 3, 4]);

        let mut buf = [0; 4];
        storage.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        let err = storage.read_exact_at(2, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        assert_eq!(storage.read_vec(1, 2).unwrap(), [2, 3]);
    }

    #[test]
    fn map_to_storage_runs_parser() {
        #[derive(Debug)]
        struct FirstByte(u8);

        impl FromStorage for FirstByte {
            type Args = ();

            fn from_storage(parent: Storage, _: ()) -> HacResult<Self> {
                Ok(Self(parent.read_vec(0, 1)?[0]))
            }
        }

        let parsed = VecStorage::new(vec![7, 8])
            .map_to_storage::<FirstByte>(())
            .unwrap();
        assert_eq!(parsed.0, 7);
    }
}
