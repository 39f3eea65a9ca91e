use super::Storage;
use binrw::io::{Read, Seek, SeekFrom};

/// wrap a Storage to get a type providing Read/Seek implementations, mostly for binrw
pub struct StorageStdioWrapper {
    s: Storage,
    offset: u64,
}

impl StorageStdioWrapper {
    pub fn new(s: Storage) -> Self {
        Self { s, offset: 0 }
    }
}

impl Read for StorageStdioWrapper {
    fn read(&mut self, buf: &mut [u8]) -> binrw::io::Result<usize> {
        self.s
            .read_at(self.offset, buf)
            .map(|size| {
                self.offset += size;
                size as _
            })
            .map_err(crate::utils::other_io_error)
    }
}

impl Seek for StorageStdioWrapper {
    fn seek(&mut self, pos: SeekFrom) -> binrw::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(off) => self.offset.checked_add_signed(off),
            SeekFrom::End(off) => self.s.length()?.checked_add_signed(off),
        };

        self.offset = target.ok_or_else(|| {
            binrw::io::Error::new(
                binrw::io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?;

        Ok(self.offset)
    }
}
