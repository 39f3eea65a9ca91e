use super::{IStorage, Storage};
use crate::HacResult;

#[derive(Debug, PartialEq, thiserror_no_std::Error)]
pub enum SubStorageError {
    #[error("attempted to create a too large substorage. parent is {parent_len} bytes, substorage is {len} bytes at offset {offset}")]
    OutOfBounds {
        parent_len: u64,
        offset: u64,
        len: u64,
    },

    #[error("parent storage needs to declare a length")]
    FailedToGetParentStorageLength,
}

/// A partial view into an existing [`Storage`]. Containers use it to hand out their
/// children as independent storages with offsets relative to the child's start.
/// Reads are clamped to the window so nothing outside of it is ever touched.
///
/// ```
/// use hacdec::prelude::*;
///
/// fn main() -> HacResult<()> {
///     let memory = VecStorage::new([0, 1, 2, 3, 4, 5, 6, 7].into());
///     let first_half = memory.clone().split(0, 4)?;
///     let second_half = memory.clone().split(4, 4)?;
///
///     let mut buf = [0; 4];
///     first_half.read_at(0, &mut buf)?;
///     assert_eq!(buf, [0, 1, 2, 3]);
///
///     second_half.read_at(0, &mut buf)?;
///     assert_eq!(buf, [4, 5, 6, 7]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SubStorage {
    parent: Storage,
    offset: u64,
    len: u64,
}

impl SubStorage {
    pub(crate) fn split_from(
        parent: Storage,
        offset: u64,
        len: u64,
    ) -> Result<Storage, SubStorageError> {
        let parent_len = parent
            .length()
            .map_err(|_| SubStorageError::FailedToGetParentStorageLength)?;

        match offset.checked_add(len) {
            Some(end) if end <= parent_len => {}
            _ => {
                return Err(SubStorageError::OutOfBounds {
                    parent_len,
                    offset,
                    len,
                })
            }
        }

        Ok(Self {
            parent,
            offset,
            len,
        }
        .into_storage())
    }
}

impl IStorage for SubStorage {
    fn read_at(&self, offset: u64, mut buf: &mut [u8]) -> HacResult<u64> {
        let available_len = self.len.saturating_sub(offset);
        let read_len = core::cmp::min(available_len, buf.len() as u64) as usize;
        buf = &mut buf[..read_len];

        if buf.is_empty() {
            return Ok(0);
        }

        self.parent.read_at(self.offset + offset, buf)
    }

    fn length(&self) -> HacResult<u64> {
        Ok(self.len)
    }
}
