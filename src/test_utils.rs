//! Writers for small synthetic container images used by the tests.

#![allow(clippy::unwrap_used)]

use alloc::{string::String, sync::Arc, vec::Vec};

use aes::{
    cipher::{generic_array::GenericArray, BlockEncryptMut, KeyInit},
    Aes128,
};

use crate::{
    keyset::{KeyAreaKeyIndex, KeyTable},
    storage::{
        crypto::{aes_raw::xts::NintendoTweak, CtrCodec, XtsCodec},
        IStorage,
    },
    sync_impl::Mutex,
    HacResult,
};

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..][..4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..][..8].copy_from_slice(&value.to_le_bytes());
}

fn align_to(len: usize, align: usize) -> usize {
    (len + align - 1) / align * align
}

fn build_partition(
    magic: &[u8; 4],
    entry_size: usize,
    files: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut strings = Vec::new();
    let mut entries = Vec::new();
    let mut data = Vec::new();

    for (name, content) in files {
        let mut entry = alloc::vec![0; entry_size];
        put_u64(&mut entry, 0, data.len() as u64);
        put_u64(&mut entry, 8, content.len() as u64);
        put_u32(&mut entry, 0x10, strings.len() as u32);
        if entry_size == 0x40 {
            put_u32(&mut entry, 0x14, content.len() as u32);
            entry[0x20..0x40].fill(0x5e);
        }

        entries.extend_from_slice(&entry);
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
        data.extend_from_slice(content);
    }

    let mut image = Vec::new();
    image.extend_from_slice(magic);
    image.extend_from_slice(&(files.len() as u32).to_le_bytes());
    image.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    image.extend_from_slice(&[0; 4]);
    image.extend_from_slice(&entries);
    image.extend_from_slice(&strings);
    image.extend_from_slice(&data);
    image
}

pub(crate) fn build_pfs0(files: &[(&str, &[u8])]) -> Vec<u8> {
    build_partition(b"PFS0", 0x18, files)
}

/// Every entry gets a hash of `0x5e` bytes and its full size as hashed size.
pub(crate) fn build_hfs0(files: &[(&str, &[u8])]) -> Vec<u8> {
    build_partition(b"HFS0", 0x40, files)
}

pub(crate) const XCI_ROOT_OFFSET: usize = 0xf000;

/// A 4GB card with the given partitions in the root HFS0, which starts at 0xf000.
pub(crate) fn build_xci(partitions: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let files: Vec<(&str, &[u8])> = partitions
        .iter()
        .map(|(name, image)| (*name, image.as_slice()))
        .collect();
    let root = build_hfs0(&files);
    let strings: usize = partitions.iter().map(|(name, _)| name.len() + 1).sum();
    let root_header_size = 0x10 + partitions.len() * 0x40 + strings;

    let mut image = alloc::vec![0; XCI_ROOT_OFFSET];
    image[0x100..0x104].copy_from_slice(b"HEAD");
    image[0x10d] = 0xf0;
    put_u64(&mut image, 0x118, 0x1ff);
    for (i, b) in image[0x120..0x130].iter_mut().enumerate() {
        *b = 0xf - i as u8;
    }
    put_u64(&mut image, 0x130, XCI_ROOT_OFFSET as u64);
    put_u64(&mut image, 0x138, root_header_size as u64);

    image.extend_from_slice(&root);
    image
}

pub(crate) struct RomFsImage {
    pub image: Vec<u8>,
    pub dir_table: usize,
    pub file_table: usize,
}

fn split_parent(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// Builds a RomFS holding `files` (paths are `/` separated), directories are created
/// as needed. With `reverse_siblings` every sibling chain is linked back to front.
pub(crate) fn build_romfs(files: &[(&str, &[u8])], reverse_siblings: bool) -> RomFsImage {
    const EMPTY: u32 = 0xffff_ffff;

    let mut dirs: Vec<String> = alloc::vec![String::new()];
    for (path, _) in files {
        let mut prefix = String::new();
        let (parent, _) = split_parent(path);
        if parent.is_empty() {
            continue;
        }
        for part in parent.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            if !dirs.contains(&prefix) {
                dirs.push(prefix.clone());
            }
        }
    }

    let dir_name = |i: usize| split_parent(&dirs[i]).1.len();
    let mut dir_offsets = Vec::new();
    let mut dir_table_len = 0;
    for i in 0..dirs.len() {
        dir_offsets.push(dir_table_len as u32);
        dir_table_len += 0x18 + align_to(if i == 0 { 0 } else { dir_name(i) }, 4);
    }

    let mut file_offsets = Vec::new();
    let mut file_table_len = 0;
    for (path, _) in files {
        file_offsets.push(file_table_len as u32);
        file_table_len += 0x20 + align_to(split_parent(path).1.len(), 4);
    }

    let dir_index = |path: &str| dirs.iter().position(|d| d == path).unwrap();
    let link = |mut members: Vec<u32>| -> (u32, Vec<(u32, u32)>) {
        if reverse_siblings {
            members.reverse();
        }
        let head = members.first().copied().unwrap_or(EMPTY);
        let siblings = members
            .iter()
            .enumerate()
            .map(|(i, m)| (*m, members.get(i + 1).copied().unwrap_or(EMPTY)))
            .collect();
        (head, siblings)
    };

    let mut dir_child = alloc::vec![EMPTY; dirs.len()];
    let mut dir_file = alloc::vec![EMPTY; dirs.len()];
    let mut dir_sibling = alloc::vec![EMPTY; dirs.len()];
    let mut file_sibling = alloc::vec![EMPTY; files.len()];

    for d in 0..dirs.len() {
        let children: Vec<u32> = (1..dirs.len())
            .filter(|c| split_parent(&dirs[*c]).0 == dirs[d])
            .map(|c| dir_offsets[c])
            .collect();
        let (head, siblings) = link(children);
        dir_child[d] = head;
        for (member, next) in siblings {
            let c = dir_offsets.iter().position(|o| *o == member).unwrap();
            dir_sibling[c] = next;
        }

        let members: Vec<u32> = (0..files.len())
            .filter(|f| split_parent(files[*f].0).0 == dirs[d])
            .map(|f| file_offsets[f])
            .collect();
        let (head, siblings) = link(members);
        dir_file[d] = head;
        for (member, next) in siblings {
            let f = file_offsets.iter().position(|o| *o == member).unwrap();
            file_sibling[f] = next;
        }
    }

    let mut dir_table = Vec::new();
    for d in 0..dirs.len() {
        let name = if d == 0 { "" } else { split_parent(&dirs[d]).1 };
        let parent = if d == 0 {
            0
        } else {
            dir_offsets[dir_index(split_parent(&dirs[d]).0)]
        };
        for v in [parent, dir_sibling[d], dir_child[d], dir_file[d], EMPTY, name.len() as u32] {
            dir_table.extend_from_slice(&v.to_le_bytes());
        }
        dir_table.extend_from_slice(name.as_bytes());
        dir_table.resize(align_to(dir_table.len(), 4), 0);
    }

    let mut file_table = Vec::new();
    let mut data = Vec::new();
    for (f, (path, content)) in files.iter().enumerate() {
        let (parent, name) = split_parent(path);
        data.resize(align_to(data.len(), 0x10), 0);

        file_table.extend_from_slice(&dir_offsets[dir_index(parent)].to_le_bytes());
        file_table.extend_from_slice(&file_sibling[f].to_le_bytes());
        file_table.extend_from_slice(&(data.len() as u64).to_le_bytes());
        file_table.extend_from_slice(&(content.len() as u64).to_le_bytes());
        file_table.extend_from_slice(&EMPTY.to_le_bytes());
        file_table.extend_from_slice(&(name.len() as u32).to_le_bytes());
        file_table.extend_from_slice(name.as_bytes());
        file_table.resize(align_to(file_table.len(), 4), 0);

        data.extend_from_slice(content);
    }
    data.resize(align_to(data.len(), 0x10), 0);

    let dir_table_offset = 0x50 + 4;
    let file_hash_offset = dir_table_offset + dir_table.len();
    let file_table_offset = file_hash_offset + 4;
    let data_offset = align_to(file_table_offset + file_table.len(), 0x10);

    let mut image = alloc::vec![0; 0x50];
    for (i, v) in [
        0x50,
        0x50,
        4,
        dir_table_offset,
        dir_table.len(),
        file_hash_offset,
        4,
        file_table_offset,
        file_table.len(),
        data_offset,
    ]
    .into_iter()
    .enumerate()
    {
        put_u64(&mut image, i * 8, v as u64);
    }
    image.extend_from_slice(&EMPTY.to_le_bytes());
    image.extend_from_slice(&dir_table);
    image.extend_from_slice(&EMPTY.to_le_bytes());
    image.extend_from_slice(&file_table);
    image.resize(data_offset, 0);
    image.extend_from_slice(&data);

    RomFsImage {
        image,
        dir_table: dir_table_offset,
        file_table: file_table_offset,
    }
}

/// Storage over a byte array that records every `(offset, len)` it is asked for.
#[derive(Debug)]
pub(crate) struct RecordingStorage {
    data: Vec<u8>,
    reads: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl RecordingStorage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reads(&self) -> Arc<Mutex<Vec<(u64, u64)>>> {
        self.reads.clone()
    }
}

impl IStorage for RecordingStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        self.reads.lock().push((offset, buf.len() as u64));

        let available = self.data.get(offset as usize..).unwrap_or_default();
        let cnt = core::cmp::min(available.len(), buf.len());
        buf[..cnt].copy_from_slice(&available[..cnt]);
        Ok(cnt as u64)
    }

    fn length(&self) -> HacResult<u64> {
        Ok(self.data.len() as u64)
    }
}

pub(crate) const TEST_KEY_REVISION: u8 = 2;
pub(crate) const TEST_KEY_AREA_KEY: [u8; 0x10] = [0x22; 0x10];
pub(crate) const TEST_PROGRAM_ID: u64 = 0x0100_0000_0000_1000;

pub(crate) fn test_header_key() -> [u8; 0x20] {
    core::array::from_fn(|i| 0x80 + i as u8)
}

/// Header key plus the application key area key for [`TEST_KEY_REVISION`].
pub(crate) fn test_keys() -> KeyTable {
    KeyTable::empty()
        .with_header_key(&test_header_key())
        .unwrap()
        .with_key_area_key(TEST_KEY_REVISION, KeyAreaKeyIndex::Application, TEST_KEY_AREA_KEY)
        .unwrap()
}

pub(crate) fn section_key(index: usize) -> [u8; 0x10] {
    [0x30 + index as u8; 0x10]
}

pub(crate) const CRYPTO_NONE: u8 = 1;
pub(crate) const CRYPTO_XTS: u8 = 2;
pub(crate) const CRYPTO_CTR: u8 = 3;
pub(crate) const CRYPTO_BKTR: u8 = 4;

pub(crate) struct TestSection {
    pub crypto: u8,
    pub hash_type: u8,
    pub seed: u64,
    /// plaintext of the whole section
    pub data: Vec<u8>,
    /// where the filesystem sits inside `data`
    pub content: (u64, u64),
}

impl TestSection {
    fn with_content(crypto: u8, hash_type: u8, content: &[u8]) -> Self {
        let mut data = alloc::vec![0xcc; 0x200];
        data.extend_from_slice(content);
        data.resize(align_to(data.len(), 0x200), 0);
        Self {
            crypto,
            hash_type,
            seed: 0x0000_0001_0000_0000 | crypto as u64,
            data,
            content: (0x200, content.len() as u64),
        }
    }

    pub fn pfs0(crypto: u8, pfs0: &[u8]) -> Self {
        Self::with_content(crypto, 2, pfs0)
    }

    pub fn romfs(crypto: u8, romfs: &[u8]) -> Self {
        Self::with_content(crypto, 3, romfs)
    }
}

pub(crate) struct NcaBuilder {
    pub version: u8,
    pub encrypt_header: bool,
    pub header_key: [u8; 0x20],
    pub rights_id: u128,
    pub key_revision: u8,
    pub key_area_key_index: u8,
    pub sections: [Option<TestSection>; 4],
}

impl NcaBuilder {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            encrypt_header: true,
            header_key: test_header_key(),
            rights_id: 0,
            key_revision: TEST_KEY_REVISION,
            key_area_key_index: KeyAreaKeyIndex::Application as u8,
            sections: [None, None, None, None],
        }
    }

    pub fn section(mut self, index: usize, section: TestSection) -> Self {
        self.sections[index] = Some(section);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = alloc::vec![0u8; 0xc00];
        header[0x200..0x203].copy_from_slice(b"NCA");
        header[0x203] = self.version;
        put_u64(&mut header, 0x210, TEST_PROGRAM_ID);
        header[0x206] = self.key_revision;
        header[0x207] = self.key_area_key_index;
        header[0x230..0x240].copy_from_slice(&self.rights_id.to_be_bytes());

        let mut kak = ecb::Encryptor::<Aes128>::new(&TEST_KEY_AREA_KEY.into());
        for i in 0..4 {
            let mut block = GenericArray::from(section_key(i));
            kak.encrypt_block_mut(&mut block);
            header[0x300 + i * 0x10..][..0x10].copy_from_slice(&block);
        }

        let mut image = header.clone();
        for (i, section) in self.sections.iter().enumerate() {
            let Some(section) = section else { continue };

            let offset = image.len();
            let mut data = section.data.clone();
            let seed = section.seed.to_be_bytes();

            match section.crypto {
                CRYPTO_CTR => CtrCodec::new(section_key(i), seed)
                    .apply(&mut data, 0)
                    .unwrap(),
                CRYPTO_XTS => {
                    let mut tweak = [0; 0x10];
                    tweak[..8].copy_from_slice(&seed);
                    XtsCodec::from_halves(&section_key(i), &section_key(i + 2))
                        .encrypt_doubling(&mut data, &tweak, 0x200, 0)
                        .unwrap()
                }
                _ => {}
            }
            image.extend_from_slice(&data);

            let entry = 0x240 + i * 0x10;
            put_u32(&mut header, entry, (offset / 0x200) as u32);
            put_u32(&mut header, entry + 4, (image.len() / 0x200) as u32);
            put_u32(&mut header, entry + 8, 1);

            let fs = &mut header[0x400 + i * 0x200..][..0x200];
            fs[..2].copy_from_slice(&2u16.to_le_bytes());
            fs[2] = if section.hash_type == 3 { 0 } else { 1 };
            fs[3] = section.hash_type;
            fs[4] = section.crypto;
            match section.hash_type {
                2 => {
                    put_u64(fs, 0x40, section.content.0);
                    put_u64(fs, 0x48, section.content.1);
                }
                3 => {
                    fs[0x8..0xc].copy_from_slice(b"IVFC");
                    put_u64(fs, 0x90, section.content.0);
                    put_u64(fs, 0x98, section.content.1);
                }
                _ => {}
            }
            put_u64(fs, 0x140, section.seed);
        }
        put_u64(&mut header, 0x208, image.len() as u64);

        if self.encrypt_header {
            let xts = XtsCodec::new(&self.header_key);
            if self.version == b'2' {
                xts.encrypt_sectors::<NintendoTweak>(&mut header[..0x400], 0x200, 0)
                    .unwrap();
                for fs in header[0x400..].chunks_exact_mut(0x200) {
                    xts.encrypt_sectors::<NintendoTweak>(fs, 0x200, 0).unwrap();
                }
            } else {
                xts.encrypt_sectors::<NintendoTweak>(&mut header, 0x200, 0)
                    .unwrap();
            }
        }

        image[..0xc00].copy_from_slice(&header);
        image
    }
}
