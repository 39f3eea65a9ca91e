pub mod aes_raw;
mod block_buffer;

pub use aes_raw::{
    ctr::{AesCtrStorage, CtrCodec},
    xts::{AesXtsStorage, XtsCodec},
};
pub use block_buffer::BlockBufferStorage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum CryptoError {
    #[error("{what} of 0x{value:x} is not a multiple of 0x{align:x}")]
    Misaligned {
        what: &'static str,
        value: u64,
        align: u64,
    },

    #[error("the 64 bit block counter would wrap")]
    KeystreamExhausted,
}

impl CryptoError {
    pub(crate) fn check_aligned(what: &'static str, value: u64, align: u64) -> Result<(), Self> {
        if align == 0 || value % align != 0 {
            return Err(Self::Misaligned { what, value, align });
        }
        Ok(())
    }
}

/// A buffered and self aligning wrapper storage for AES128 in CTR mode.
pub type AlignedCtrStorage = BlockBufferStorage<AesCtrStorage, { aes_raw::BLOCK_SIZE }>;

/// A buffered and self aligning wrapper storage for AES128 in XTS mode.
pub type AlignedXtsStorage = BlockBufferStorage<AesXtsStorage, { aes_raw::xts::SECTOR_SIZE }>;
