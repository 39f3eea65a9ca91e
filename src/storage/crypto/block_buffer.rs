use crate::{
    storage::{IStorage, Storage},
    utils::{align_down, align_up},
    HacResult,
};
use core::fmt;

/// Makes an aligned-only storage readable at arbitrary offsets: each read is widened
/// to the enclosing `N` byte aligned window, read and decrypted as a whole, then
/// sliced back down to what the caller asked for.
pub struct BlockBufferStorage<S: IStorage, const N: usize> {
    inner: S,
}

impl<S: IStorage, const N: usize> BlockBufferStorage<S, N> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: IStorage + 'static, const N: usize> BlockBufferStorage<S, N> {
    pub fn wrap(inner: S) -> Storage {
        Storage::new(Self::new(inner))
    }
}

impl<S: IStorage, const N: usize> fmt::Debug for BlockBufferStorage<S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBufferStorage")
            .field("block_size", &N)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S: IStorage, const N: usize> IStorage for BlockBufferStorage<S, N> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        let len = self.inner.length()?;
        if buf.is_empty() || offset >= len {
            return Ok(0);
        }

        let end = core::cmp::min(offset.saturating_add(buf.len() as u64), len);
        let aligned_start = align_down(offset, N as u64);
        let aligned_end = align_up(end, N as u64).unwrap_or(u64::MAX);

        let mut window = alloc::vec![0; (aligned_end - aligned_start) as usize];
        let cnt = self.inner.read_at(aligned_start, &mut window)?;

        let skip = (offset - aligned_start) as usize;
        let available = (cnt as usize).saturating_sub(skip);
        let copy_len = core::cmp::min(available, (end - offset) as usize);
        buf[..copy_len].copy_from_slice(&window[skip..][..copy_len]);

        Ok(copy_len as _)
    }

    fn length(&self) -> HacResult<u64> {
        self.inner.length()
    }
}
