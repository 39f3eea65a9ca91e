//! Key material needed to open NCAs.
//!
//! A [`KeyTable`] is built once, either from already derived keys or by running
//! [`KeyTable::derive`] over the master keys, and then shared read-only (usually as
//! an `Arc<KeyTable>`) by every container that needs it.

use aes::{
    cipher::{generic_array::GenericArray, BlockDecryptMut, KeyInit},
    Aes128,
};
use alloc::string::String;
use core::fmt;

pub const MAX_KEY_REVISIONS: usize = 0x20;
pub const KEY_AREA_KEY_ROLES: usize = 3;

pub type Aes128Key = [u8; 0x10];

#[derive(Debug, Clone, PartialEq, Eq, thiserror_no_std::Error)]
pub enum KeyError {
    #[error("key {key_name:?} not found")]
    MissingKey { key_name: String },

    #[error("key {key_name}_{index:02x} is not present")]
    MissingRevision { key_name: String, index: u8 },

    #[error("key area key role {role} does not exist")]
    InvalidRole { role: u8 },

    #[error("key of {actual} bytes given where {expected} bytes are required")]
    InvalidLength { expected: usize, actual: usize },

    #[error("section {index} has no xts key pair in the key area")]
    NoXtsKeyForSection { index: usize },

    #[error("titlekey crypto is in use (rights id {rights_id}), the key area cannot be used")]
    TitleKeyRequired { rights_id: crate::common::RightsId },
}

/// Which of the three key area keys an NCA is encrypted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAreaKeyIndex {
    Application = 0x0,
    Ocean = 0x1,
    System = 0x2,
}

impl KeyAreaKeyIndex {
    pub fn from_raw(raw: u8) -> Result<Self, KeyError> {
        match raw {
            0 => Ok(Self::Application),
            1 => Ok(Self::Ocean),
            2 => Ok(Self::System),
            role => Err(KeyError::InvalidRole { role }),
        }
    }
}

impl fmt::Display for KeyAreaKeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                KeyAreaKeyIndex::Application => "application",
                KeyAreaKeyIndex::Ocean => "ocean",
                KeyAreaKeyIndex::System => "system",
            }
        )
    }
}

/// The non-secret seeds the key hierarchy is unwrapped with.
#[derive(Debug, Clone, Default)]
pub struct KeySources {
    pub aes_kek_generation_source: Aes128Key,
    pub aes_key_generation_source: Aes128Key,
    pub header_kek_source: Aes128Key,
    pub header_key_source: [u8; 0x20],
    pub key_area_key_application_source: Aes128Key,
    pub key_area_key_ocean_source: Aes128Key,
    pub key_area_key_system_source: Aes128Key,
}

impl KeySources {
    fn key_area_key_source(&self, role: KeyAreaKeyIndex) -> &Aes128Key {
        match role {
            KeyAreaKeyIndex::Application => &self.key_area_key_application_source,
            KeyAreaKeyIndex::Ocean => &self.key_area_key_ocean_source,
            KeyAreaKeyIndex::System => &self.key_area_key_system_source,
        }
    }
}

fn is_zero(key: &[u8]) -> bool {
    key.iter().all(|b| *b == 0)
}

pub(crate) fn ecb_decrypt_block(key: &Aes128Key, data: &Aes128Key) -> Aes128Key {
    let mut block = GenericArray::from(*data);
    ecb::Decryptor::<Aes128>::new(key.into()).decrypt_block_mut(&mut block);
    block.into()
}

/// Three rounds of ECB unwrapping: the kek seed with the master key, the source with
/// that, and finally the key seed with the result.
pub fn generate_kek(
    src: &Aes128Key,
    master_key: &Aes128Key,
    kek_seed: &Aes128Key,
    key_seed: &Aes128Key,
) -> Aes128Key {
    let kek = ecb_decrypt_block(master_key, kek_seed);
    let src_kek = ecb_decrypt_block(&kek, src);
    ecb_decrypt_block(&src_kek, key_seed)
}

#[derive(Clone)]
pub struct KeyTable {
    master_keys: [Aes128Key; MAX_KEY_REVISIONS],
    header_key: [u8; 0x20],
    key_area_keys: [[Aes128Key; KEY_AREA_KEY_ROLES]; MAX_KEY_REVISIONS],
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl KeyTable {
    pub fn empty() -> Self {
        Self {
            master_keys: [[0; 0x10]; MAX_KEY_REVISIONS],
            header_key: [0; 0x20],
            key_area_keys: [[[0; 0x10]; KEY_AREA_KEY_ROLES]; MAX_KEY_REVISIONS],
        }
    }

    /// Derives the header key and every key area key reachable from `master_keys`.
    /// Revisions without a master key stay zero and fail on use.
    pub fn derive(master_keys: &[Aes128Key], sources: &KeySources) -> Self {
        let mut table = Self::empty();

        for (revision, master_key) in master_keys.iter().take(MAX_KEY_REVISIONS).enumerate() {
            table.master_keys[revision] = *master_key;
        }

        let master_key_0 = table.master_keys[0];
        if !is_zero(&master_key_0)
            && !is_zero(&sources.header_kek_source)
            && !is_zero(&sources.header_key_source)
        {
            let header_kek = generate_kek(
                &sources.header_kek_source,
                &master_key_0,
                &sources.aes_kek_generation_source,
                &sources.aes_key_generation_source,
            );

            for (dst, src) in table
                .header_key
                .chunks_exact_mut(0x10)
                .zip(sources.header_key_source.chunks_exact(0x10))
            {
                let mut block = [0; 0x10];
                block.copy_from_slice(src);
                dst.copy_from_slice(&ecb_decrypt_block(&header_kek, &block));
            }
            log::debug!("derived header key");
        }

        for revision in 0..MAX_KEY_REVISIONS {
            let master_key = table.master_keys[revision];
            if is_zero(&master_key) {
                continue;
            }

            for role in [
                KeyAreaKeyIndex::Application,
                KeyAreaKeyIndex::Ocean,
                KeyAreaKeyIndex::System,
            ] {
                table.key_area_keys[revision][role as usize] = generate_kek(
                    sources.key_area_key_source(role),
                    &master_key,
                    &sources.aes_kek_generation_source,
                    &sources.aes_key_generation_source,
                );
            }
            log::debug!("derived key area keys for revision {revision:02x}");
        }

        table
    }

    /// Sets the header key, a 16 byte key is used for both XTS halves.
    pub fn with_header_key(mut self, key: &[u8]) -> Result<Self, KeyError> {
        match key.len() {
            0x10 => {
                self.header_key[..0x10].copy_from_slice(key);
                self.header_key[0x10..].copy_from_slice(key);
            }
            0x20 => self.header_key.copy_from_slice(key),
            actual => {
                return Err(KeyError::InvalidLength {
                    expected: 0x20,
                    actual,
                })
            }
        }
        Ok(self)
    }

    pub fn with_master_key(mut self, revision: u8, key: Aes128Key) -> Result<Self, KeyError> {
        let slot = self
            .master_keys
            .get_mut(revision as usize)
            .ok_or_else(|| KeyError::MissingRevision {
                key_name: "master_key".into(),
                index: revision,
            })?;
        *slot = key;
        Ok(self)
    }

    pub fn with_key_area_key(
        mut self,
        revision: u8,
        role: KeyAreaKeyIndex,
        key: Aes128Key,
    ) -> Result<Self, KeyError> {
        let slot = self
            .key_area_keys
            .get_mut(revision as usize)
            .ok_or_else(|| KeyError::MissingRevision {
                key_name: alloc::format!("key_area_key_{role}"),
                index: revision,
            })?;
        slot[role as usize] = key;
        Ok(self)
    }

    pub fn header_key(&self) -> Result<&[u8; 0x20], KeyError> {
        if is_zero(&self.header_key) {
            return Err(KeyError::MissingKey {
                key_name: "header_key".into(),
            });
        }
        Ok(&self.header_key)
    }

    pub fn master_key(&self, revision: u8) -> Result<&Aes128Key, KeyError> {
        self.master_keys
            .get(revision as usize)
            .filter(|k| !is_zero(*k))
            .ok_or_else(|| KeyError::MissingRevision {
                key_name: "master_key".into(),
                index: revision,
            })
    }

    pub fn key_area_key(&self, revision: u8, role: KeyAreaKeyIndex) -> Result<&Aes128Key, KeyError> {
        self.key_area_keys
            .get(revision as usize)
            .map(|roles| &roles[role as usize])
            .filter(|k| !is_zero(*k))
            .ok_or_else(|| KeyError::MissingRevision {
                key_name: alloc::format!("key_area_key_{role}"),
                index: revision,
            })
    }
}

impl fmt::Debug for KeyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self
            .key_area_keys
            .iter()
            .filter(|roles| roles.iter().any(|k| !is_zero(k)))
            .count();
        f.debug_struct("KeyTable")
            .field("header_key", &!is_zero(&self.header_key))
            .field("key_area_revisions", &present)
            .finish_non_exhaustive()
    }
}
