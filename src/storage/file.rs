use super::{IStorage, Storage};
use crate::{sync_impl::Mutex, HacResult};

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug)]
pub struct FileStorage {
    fp: Mutex<File>,
}

impl FileStorage {
    pub fn new(fp: File) -> Storage {
        Storage::new(Self { fp: Mutex::new(fp) })
    }

    pub fn open(path: impl AsRef<Path>) -> io::Result<Storage> {
        File::open(path).map(Self::new)
    }
}

impl IStorage for FileStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        let mut fp = self.fp.lock();

        fp.seek(SeekFrom::Start(offset))?;

        // File::read may return early, keep going until eof or a full buffer
        let mut cnt = 0;
        while cnt < buf.len() {
            match fp.read(&mut buf[cnt..]) {
                Ok(0) => break,
                Ok(n) => cnt += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(cnt as _)
    }

    fn length(&self) -> HacResult<u64> {
        Ok(self.fp.lock().metadata()?.len())
    }
}
