use alloc::string::String;
use bstr::BString;

#[derive(Debug, thiserror_no_std::Error)]
pub enum HacError {
    #[error("binrw error")]
    BinRwError(#[from] binrw::Error),

    #[error("IO error")]
    IoError(#[from] binrw::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Key(#[from] crate::keyset::KeyError),

    #[error(transparent)]
    Crypto(#[from] crate::storage::crypto::CryptoError),

    #[error("error with an nca")]
    Nca(#[from] crate::containers::nca::NcaError),

    #[error("error with a partition fs")]
    PartitionFs(#[from] crate::containers::partitionfs::PartitionFsError),

    #[error("error with a romfs")]
    RomFs(#[from] crate::containers::romfs::RomFsError),

    #[error("error with a xci")]
    Xci(#[from] crate::containers::xci::XciError),

    #[error("substorage error")]
    SubStorage(#[from] crate::storage::SubStorageError),
}

/// Coarse classification of a [`HacError`], mirroring which object a failure is fatal to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// bad magic or unsupported subtype, fatal to the object being parsed
    Format,
    /// a declared range exceeds its container, fatal to that read
    Bounds,
    /// required key material is absent
    Key,
    /// the byte source failed
    Io,
}

impl HacError {
    pub fn kind(&self) -> ErrorKind {
        use crate::containers::{nca::NcaError, partitionfs::PartitionFsError, romfs::RomFsError};

        match self {
            HacError::IoError(_) => ErrorKind::Io,
            HacError::BinRwError(binrw::Error::Io(_)) => ErrorKind::Io,
            HacError::BinRwError(_) | HacError::Format(_) | HacError::Xci(_) => ErrorKind::Format,
            HacError::Bounds(_) | HacError::SubStorage(_) | HacError::Crypto(_) => ErrorKind::Bounds,
            HacError::Key(_) => ErrorKind::Key,
            HacError::Nca(NcaError::SectionOutOfBounds { .. }) => ErrorKind::Bounds,
            HacError::Nca(_) => ErrorKind::Format,
            HacError::PartitionFs(PartitionFsError::EntryOutOfBounds { .. }) => ErrorKind::Bounds,
            HacError::PartitionFs(_) => ErrorKind::Format,
            HacError::RomFs(RomFsError::FileOutOfBounds { .. }) => ErrorKind::Bounds,
            HacError::RomFs(_) => ErrorKind::Format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum FormatError {
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: String, found: BString },

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("corrupted {what}: {reason}")]
    Corrupted { what: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
#[error("{context}: range 0x{offset:x}+0x{size:x} exceeds limit 0x{limit:x}")]
pub struct BoundsError {
    pub context: String,
    pub offset: u64,
    pub size: u64,
    pub limit: u64,
}

impl BoundsError {
    /// Returns an error if `offset + size` does not fit in `limit`.
    pub fn check(
        context: impl FnOnce() -> String,
        offset: u64,
        size: u64,
        limit: u64,
    ) -> Result<(), Self> {
        match offset.checked_add(size) {
            Some(end) if end <= limit => Ok(()),
            _ => Err(Self {
                context: context(),
                offset,
                size,
                limit,
            }),
        }
    }
}

impl From<HacError> for binrw::io::Error {
    fn from(value: HacError) -> Self {
        crate::utils::other_io_error(value)
    }
}

pub type HacResult<T> = core::result::Result<T, HacError>;
