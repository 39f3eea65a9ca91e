//! Nintendo Content Archives.
//!
//! Opening an NCA runs the header engine: the first 0x400 bytes are XTS decrypted
//! with the header key to find the version, the fs headers are decrypted the way that
//! version wants, and finally the key area is unwrapped into the four section keys.
//! Sections are then decrypted lazily on read.

use crate::{
    common::RightsId,
    error::FormatError,
    keyset::{ecb_decrypt_block, KeyError, KeyTable},
    storage::{
        crypto::{aes_raw::xts::NintendoTweak, XtsCodec},
        FromStorage, Storage,
    },
    HacResult,
};
use alloc::{string::ToString, sync::Arc, vec::Vec};

use binrw::{io::Cursor, BinRead};

pub mod header;
pub use header::*;
pub mod section;
pub use section::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum NcaError {
    #[error("NCA0 archives are not supported")]
    Nca0Unsupported,

    #[error("section {index} at 0x{offset:x}+0x{size:x} exceeds the 0x{limit:x} byte nca")]
    SectionOutOfBounds {
        index: usize,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("section {index} is not present")]
    SectionAbsent { index: usize },

    #[error("section {index} uses BKTR crypto which can't be decrypted")]
    BktrUnsupported { index: usize },

    #[error("section {index} has unknown encryption type {raw}")]
    UnknownEncryption { index: usize, raw: u8 },
}

pub const SECTION_COUNT: usize = 4;

/// Decrypts the 0xc00 byte header block in place and returns the detected version.
///
/// NCA3 encrypts the whole block as one XTS area starting at sector 0. NCA2 only
/// does so for the first 0x400 bytes and encrypts every fs header on its own, each
/// one starting over at sector 0.
fn decrypt_header(buf: &mut [u8], keys: &KeyTable) -> HacResult<NcaVersion> {
    let magic = &buf[0x200..][..4];
    if NcaVersion::is_known(magic) {
        log::debug!("header is not encrypted");
        return check_version(magic);
    }

    let xts = XtsCodec::new(keys.header_key()?);

    let mut first = [0; NCA_HEADER_SIZE];
    first.copy_from_slice(&buf[..NCA_HEADER_SIZE]);
    xts.decrypt_sectors::<NintendoTweak>(&mut first, FS_HEADER_SIZE, 0)?;

    let version = check_version(&first[0x200..][..4])?;
    match version {
        NcaVersion::Nca3 => {
            xts.decrypt_sectors::<NintendoTweak>(&mut buf[..NCA_FULL_HEADER_SIZE], FS_HEADER_SIZE, 0)?
        }
        _ => {
            buf[..NCA_HEADER_SIZE].copy_from_slice(&first);
            for fs_header in buf[NCA_HEADER_SIZE..NCA_FULL_HEADER_SIZE].chunks_exact_mut(FS_HEADER_SIZE) {
                xts.decrypt_sectors::<NintendoTweak>(fs_header, FS_HEADER_SIZE, 0)?;
            }
        }
    }

    Ok(version)
}

fn check_version(magic: &[u8]) -> HacResult<NcaVersion> {
    match NcaVersion::detect(magic) {
        Some(v @ (NcaVersion::Nca3 | NcaVersion::Nca2)) => Ok(v),
        Some(NcaVersion::Nca0) => Err(NcaError::Nca0Unsupported.into()),
        _ => Err(FormatError::BadMagic {
            expected: "NCA3/NCA2".to_string(),
            found: magic.into(),
        }
        .into()),
    }
}

fn decrypt_key_area(header: &NcaHeader, keys: &KeyTable) -> Result<[[u8; 0x10]; 4], KeyError> {
    if header.has_rights_id() {
        return Err(KeyError::TitleKeyRequired {
            rights_id: header.rights_id,
        });
    }

    let kek = keys.key_area_key(header.key_revision, header.key_area_key_role()?)?;

    let mut section_keys = [[0; 0x10]; 4];
    for (dst, src) in section_keys.iter_mut().zip(&header.encrypted_key_area) {
        *dst = ecb_decrypt_block(kek, &src.0);
    }
    Ok(section_keys)
}

/// Results of [`Nca::contents`], every section either resolved or warned about.
#[derive(Debug)]
pub struct NcaContents {
    pub sections: Vec<(usize, SectionContent)>,
    pub warnings: Vec<SectionWarning>,
}

#[derive(Debug)]
pub struct Nca {
    storage: Storage,
    version: NcaVersion,
    header: NcaHeader,
    fs_headers: [Option<Arc<FsHeader>>; SECTION_COUNT],
    section_keys: Result<[[u8; 0x10]; 4], KeyError>,
}

impl Nca {
    pub fn open(storage: Storage, keys: &KeyTable) -> HacResult<Self> {
        let mut buf = storage.read_vec(0, NCA_FULL_HEADER_SIZE)?;
        let version = decrypt_header(&mut buf, keys)?;
        log::debug!("opened {version} header");

        let header = NcaHeader::read(&mut Cursor::new(&buf[..NCA_HEADER_SIZE]))?;

        let mut fs_headers = [None, None, None, None];
        for (idx, (slot, entry)) in fs_headers.iter_mut().zip(&header.fs_entries).enumerate() {
            if !entry.is_present() {
                continue;
            }

            let raw = &buf[NCA_HEADER_SIZE + idx * FS_HEADER_SIZE..][..FS_HEADER_SIZE];
            *slot = Some(Arc::new(FsHeader::read(&mut Cursor::new(raw))?));
        }

        // a missing key only matters once a section needs decrypting
        let section_keys = decrypt_key_area(&header, keys);
        if let Err(e) = &section_keys {
            log::debug!("key area not available: {e}");
        }

        Ok(Self {
            storage,
            version,
            header,
            fs_headers,
            section_keys,
        })
    }

    pub fn header(&self) -> &NcaHeader {
        &self.header
    }

    pub fn version(&self) -> NcaVersion {
        self.version
    }

    pub fn rights_id(&self) -> RightsId {
        self.header.rights_id
    }

    /// The decrypted key area.
    pub fn section_keys(&self) -> Result<&[[u8; 0x10]; 4], KeyError> {
        self.section_keys.as_ref().map_err(Clone::clone)
    }

    pub fn fs_header(&self, index: usize) -> Option<&FsHeader> {
        self.fs_headers.get(index)?.as_deref()
    }

    pub fn section(&self, index: usize) -> HacResult<NcaSection> {
        let fs_header = self
            .fs_headers
            .get(index)
            .cloned()
            .flatten()
            .ok_or(NcaError::SectionAbsent { index })?;

        let entry = &self.header.fs_entries[index];
        let (offset, size) = (entry.offset(), entry.size());
        let limit = self.storage.length()?;
        if offset.checked_add(size).map_or(true, |end| end > limit) {
            return Err(NcaError::SectionOutOfBounds {
                index,
                offset,
                size,
                limit,
            }
            .into());
        }

        Ok(NcaSection {
            index,
            offset,
            size,
            fs_header,
            nca_storage: self.storage.clone(),
            keys: self.section_keys.clone(),
        })
    }

    /// All present sections, in index order.
    pub fn sections(&self) -> impl Iterator<Item = HacResult<NcaSection>> + '_ {
        (0..SECTION_COUNT)
            .filter(|i| self.fs_headers[*i].is_some())
            .map(|i| self.section(i))
    }

    /// Opens the filesystem of every present section. A section that fails is
    /// skipped with a warning, the others are still returned.
    pub fn contents(&self) -> NcaContents {
        let mut contents = NcaContents {
            sections: Vec::new(),
            warnings: Vec::new(),
        };

        for index in (0..SECTION_COUNT).filter(|i| self.fs_headers[*i].is_some()) {
            match self.section(index).and_then(|s| s.content()) {
                Ok(content) => {
                    if let SectionContent::Unsupported(u) = &content {
                        log::warn!("section {index}: {}", u.reason);
                    }
                    contents.sections.push((index, content));
                }
                Err(e) => {
                    log::warn!("skipping section {index}: {e}");
                    contents.warnings.push(SectionWarning::Skipped {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        contents
    }
}

impl FromStorage for Nca {
    type Args = Arc<KeyTable>;

    fn from_storage(parent: Storage, keys: Self::Args) -> HacResult<Self> {
        Nca::open(parent, &keys)
    }
}
