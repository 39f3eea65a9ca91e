//! A Storage wrapping a byte array in memory.

use super::{IStorage, Storage};
use crate::HacResult;
use alloc::vec::Vec;

/// A read-only Storage over a byte array in memory.
#[derive(Debug)]
pub struct VecStorage(Vec<u8>);

impl VecStorage {
    pub fn new(buf: Vec<u8>) -> Storage {
        Storage::new(Self(buf))
    }
}

impl IStorage for VecStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };

        if let Some(available_buf) = self.0.get(offset..) {
            let read_len = core::cmp::min(available_buf.len(), buf.len());
            buf[..read_len].copy_from_slice(&available_buf[..read_len]);
            return Ok(read_len as _);
        }
        Ok(0)
    }

    fn length(&self) -> HacResult<u64> {
        Ok(self.0.len() as _)
    }
}
