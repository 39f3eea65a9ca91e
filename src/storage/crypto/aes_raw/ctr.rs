use crate::{
    storage::{crypto::CryptoError, IStorage, Storage},
    HacResult,
};
use aes::{
    cipher::{KeyIvInit, StreamCipher},
    Aes128,
};
use ctr::Ctr64BE;

use core::fmt;

use super::BLOCK_SIZE;

/// AES-128-CTR keyed for one NCA section. The counter is the section's 8 byte seed
/// followed by the big endian index of the 16 byte block, so any block aligned
/// offset can be decrypted without touching what comes before it.
#[derive(Clone)]
pub struct CtrCodec {
    key: [u8; 0x10],
    seed: [u8; 8],
}

impl CtrCodec {
    pub fn new(key: [u8; 0x10], seed: [u8; 8]) -> Self {
        Self { key, seed }
    }

    pub fn counter(&self, block_index: u64) -> [u8; BLOCK_SIZE] {
        let mut ctr = [0; BLOCK_SIZE];
        ctr[..8].copy_from_slice(&self.seed);
        ctr[8..].copy_from_slice(&block_index.to_be_bytes());
        ctr
    }

    /// XORs the keystream starting at block `block_index` into `buf`.
    pub fn apply(&self, buf: &mut [u8], block_index: u64) -> Result<(), CryptoError> {
        CryptoError::check_aligned("ctr buffer length", buf.len() as u64, BLOCK_SIZE as u64)?;

        Self::apply_with_counter(&self.key, &self.counter(block_index), buf)
    }

    /// Plain AES-CTR with an explicit 16 byte counter, only the low 64 bits are incremented.
    pub fn apply_with_counter(
        key: &[u8; 0x10],
        counter: &[u8; BLOCK_SIZE],
        buf: &mut [u8],
    ) -> Result<(), CryptoError> {
        let mut aes = Ctr64BE::<Aes128>::new(key.into(), counter.into());
        aes.try_apply_keystream(buf)
            .map_err(|_| CryptoError::KeystreamExhausted)
    }
}

impl fmt::Debug for CtrCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtrCodec")
            .field("seed", &crate::utils::hex_str(&self.seed))
            .finish_non_exhaustive()
    }
}

/// Section storage decrypting AES-CTR. Offsets are relative to the section start
/// and must be block aligned.
#[derive(Clone)]
pub struct AesCtrStorage {
    parent: Storage,
    codec: CtrCodec,
}

impl AesCtrStorage {
    pub fn new(parent: Storage, codec: CtrCodec) -> Self {
        Self { parent, codec }
    }
}

impl fmt::Debug for AesCtrStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCtrStorage")
            .field("parent", &self.parent)
            .field("codec", &self.codec)
            .finish()
    }
}

impl IStorage for AesCtrStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        CryptoError::check_aligned("ctr read offset", offset, BLOCK_SIZE as u64)?;

        let len = self.parent.read_at(offset, buf)?;
        self.codec
            .apply(&mut buf[..len as usize], offset / BLOCK_SIZE as u64)?;
        Ok(len)
    }

    fn length(&self) -> HacResult<u64> {
        self.parent.length()
    }
}
