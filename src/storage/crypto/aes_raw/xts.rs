//! AES-128-XTS with the two tweak conventions found in NCAs.
//!
//! * the counter convention derives each sector's tweak by encrypting a [`Tweak`]
//!   of the sector number, this is what the NCA header uses (with [`NintendoTweak`]).
//! * the doubling convention encrypts a stored initial tweak once and reaches sector
//!   `s` by multiplying with `α^s`, then keeps doubling for each block inside the
//!   sector. Section data uses this one.
//!
//! Both are kept separate on purpose, they are not interchangeable.

use crate::{
    storage::{crypto::CryptoError, IStorage, Storage},
    HacResult,
};
use alloc::sync::Arc;
use core::fmt;

use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit},
    Aes128,
};
use xts_mode::Xts128;

use super::{xor_block, BLOCK_SIZE};

pub const SECTOR_SIZE: usize = 0x200;

pub trait Tweak: fmt::Debug + Clone + 'static {
    fn get_tweak(sector: u128) -> [u8; 0x10];
}

/// IEEE P1619 tweak, the sector number in little endian.
#[derive(Debug, Clone)]
pub struct DefaultTweak;
impl Tweak for DefaultTweak {
    fn get_tweak(sector: u128) -> [u8; 0x10] {
        xts_mode::get_tweak_default(sector)
    }
}

/// Nintendo's tweak, the sector number in big endian.
#[derive(Debug, Clone)]
pub struct NintendoTweak;
impl Tweak for NintendoTweak {
    fn get_tweak(sector: u128) -> [u8; 0x10] {
        crate::utils::aes_xtsn_tweak(sector)
    }
}

const GF_FEEDBACK: u128 = 0x87 << 120;

// byte 0 is the most significant byte, overflow out of it feeds back into byte 0
fn gf_double(v: u128) -> u128 {
    let carry = v >> 127;
    let v = v << 1;
    if carry == 1 {
        v ^ GF_FEEDBACK
    } else {
        v
    }
}

fn gf_mul(a: u128, b: u128) -> u128 {
    (0..128).rev().fold(0, |acc, bit| {
        let acc = gf_double(acc);
        if (b >> bit) & 1 == 1 {
            acc ^ a
        } else {
            acc
        }
    })
}

/// Multiplies the tweak by α in place.
pub fn gf128_mul_alpha(tweak: &mut [u8; BLOCK_SIZE]) {
    *tweak = gf_double(u128::from_be_bytes(*tweak)).to_be_bytes();
}

/// Returns `tweak · α^n`, using square and multiply so large sector numbers stay cheap.
pub fn gf128_mul_alpha_pow(tweak: &[u8; BLOCK_SIZE], mut n: u64) -> [u8; BLOCK_SIZE] {
    let mut acc = 1u128;
    let mut base = 2u128;
    while n > 0 {
        if n & 1 == 1 {
            acc = gf_mul(acc, base);
        }
        base = gf_mul(base, base);
        n >>= 1;
    }
    gf_mul(u128::from_be_bytes(*tweak), acc).to_be_bytes()
}

pub struct XtsCodec {
    xts: Xts128<Aes128>,
    data: Aes128,
    tweak: Aes128,
}

impl XtsCodec {
    /// `key` is the data key followed by the tweak key.
    pub fn new(key: &[u8; 0x20]) -> Self {
        let (data, tweak) = key.split_at(0x10);
        Self {
            xts: Xts128::new(
                Aes128::new(GenericArray::from_slice(data)),
                Aes128::new(GenericArray::from_slice(tweak)),
            ),
            data: Aes128::new(GenericArray::from_slice(data)),
            tweak: Aes128::new(GenericArray::from_slice(tweak)),
        }
    }

    pub fn from_halves(data_key: &[u8; 0x10], tweak_key: &[u8; 0x10]) -> Self {
        let mut key = [0; 0x20];
        key[..0x10].copy_from_slice(data_key);
        key[0x10..].copy_from_slice(tweak_key);
        Self::new(&key)
    }

    fn check_area(buf: &[u8], sector_size: usize) -> Result<(), CryptoError> {
        CryptoError::check_aligned("xts sector size", sector_size as u64, BLOCK_SIZE as u64)?;
        CryptoError::check_aligned("xts buffer length", buf.len() as u64, sector_size as u64)
    }

    /// Counter convention: sector `first_sector + i` uses `T::get_tweak` of its number.
    pub fn decrypt_sectors<T: Tweak>(
        &self,
        buf: &mut [u8],
        sector_size: usize,
        first_sector: u128,
    ) -> Result<(), CryptoError> {
        Self::check_area(buf, sector_size)?;
        self.xts
            .decrypt_area(buf, sector_size, first_sector, T::get_tweak);
        Ok(())
    }

    pub fn encrypt_sectors<T: Tweak>(
        &self,
        buf: &mut [u8],
        sector_size: usize,
        first_sector: u128,
    ) -> Result<(), CryptoError> {
        Self::check_area(buf, sector_size)?;
        self.xts
            .encrypt_area(buf, sector_size, first_sector, T::get_tweak);
        Ok(())
    }

    /// Decrypts a single data unit with an explicit (unencrypted) tweak value.
    pub fn decrypt_unit(&self, buf: &mut [u8], tweak: [u8; BLOCK_SIZE]) -> Result<(), CryptoError> {
        Self::check_area(buf, BLOCK_SIZE)?;
        if !buf.is_empty() {
            self.xts.decrypt_sector(buf, tweak);
        }
        Ok(())
    }

    fn doubling_tweak(&self, initial_tweak: &[u8; BLOCK_SIZE], sector: u64) -> [u8; BLOCK_SIZE] {
        let mut tweak0 = GenericArray::clone_from_slice(initial_tweak);
        self.tweak.encrypt_block(&mut tweak0);

        let mut tweak = [0; BLOCK_SIZE];
        tweak.copy_from_slice(&tweak0);
        gf128_mul_alpha_pow(&tweak, sector)
    }

    /// Runs `op` over every block of `buf` with its doubling tweak. The power of α
    /// is only computed for `first_sector`, each following sector is one more doubling.
    fn apply_doubling(
        &self,
        buf: &mut [u8],
        initial_tweak: &[u8; BLOCK_SIZE],
        sector_size: usize,
        first_sector: u64,
        op: impl Fn(&Aes128, &mut aes::Block),
    ) -> Result<(), CryptoError> {
        Self::check_area(buf, sector_size)?;
        if buf.is_empty() {
            return Ok(());
        }

        let mut sector_tweak = self.doubling_tweak(initial_tweak, first_sector);
        for data in buf.chunks_exact_mut(sector_size) {
            let mut tweak = sector_tweak;
            for block in data.chunks_exact_mut(BLOCK_SIZE) {
                xor_block(block, &tweak);
                op(&self.data, GenericArray::from_mut_slice(block));
                xor_block(block, &tweak);
                gf128_mul_alpha(&mut tweak);
            }
            gf128_mul_alpha(&mut sector_tweak);
        }

        Ok(())
    }

    /// Doubling convention, see the module docs.
    pub fn decrypt_doubling(
        &self,
        buf: &mut [u8],
        initial_tweak: &[u8; BLOCK_SIZE],
        sector_size: usize,
        first_sector: u64,
    ) -> Result<(), CryptoError> {
        self.apply_doubling(buf, initial_tweak, sector_size, first_sector, |aes, block| {
            aes.decrypt_block(block)
        })
    }

    pub fn encrypt_doubling(
        &self,
        buf: &mut [u8],
        initial_tweak: &[u8; BLOCK_SIZE],
        sector_size: usize,
        first_sector: u64,
    ) -> Result<(), CryptoError> {
        self.apply_doubling(buf, initial_tweak, sector_size, first_sector, |aes, block| {
            aes.encrypt_block(block)
        })
    }
}

impl fmt::Debug for XtsCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XtsCodec").finish_non_exhaustive()
    }
}

/// Section storage decrypting with the doubling convention. Offsets are relative to
/// the section start and must be sector aligned.
#[derive(Clone)]
pub struct AesXtsStorage {
    parent: Storage,
    codec: Arc<XtsCodec>,
    initial_tweak: [u8; BLOCK_SIZE],
}

impl AesXtsStorage {
    pub fn new(parent: Storage, codec: XtsCodec, initial_tweak: [u8; BLOCK_SIZE]) -> Self {
        Self {
            parent,
            codec: Arc::new(codec),
            initial_tweak,
        }
    }
}

impl fmt::Debug for AesXtsStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesXtsStorage")
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl IStorage for AesXtsStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> HacResult<u64> {
        CryptoError::check_aligned("xts read offset", offset, SECTOR_SIZE as u64)?;

        let cnt = self.parent.read_at(offset, buf)?;
        self.codec.decrypt_doubling(
            &mut buf[..cnt as usize],
            &self.initial_tweak,
            SECTOR_SIZE,
            offset / SECTOR_SIZE as u64,
        )?;

        Ok(cnt)
    }

    fn length(&self) -> HacResult<u64> {
        self.parent.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::VecStorage, utils::hex_str_to_array};

    fn key_00_to_1f() -> [u8; 0x20] {
        core::array::from_fn(|i| i as u8)
    }

    #[test]
    fn ieee_p1619_vectors() {
        let codec = XtsCodec::new(&[0; 0x20]);
        let mut buf = [0; 0x20];
        codec.encrypt_sectors::<DefaultTweak>(&mut buf, 0x20, 0).unwrap();
        assert_eq!(
            buf,
            hex_str_to_array::<0x20>(
                "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e"
            )
            .unwrap()
        );

        let codec = XtsCodec::from_halves(&[0x11; 0x10], &[0x22; 0x10]);
        let mut buf = [0x44; 0x20];
        codec
            .encrypt_sectors::<DefaultTweak>(&mut buf, 0x20, 0x3333333333)
            .unwrap();
        assert_eq!(
            buf,
            hex_str_to_array::<0x20>(
                "c454185e6a16936e39334038acef838bfb186fff7480adc4289382ecd6d394f0"
            )
            .unwrap()
        );
        codec
            .decrypt_sectors::<DefaultTweak>(&mut buf, 0x20, 0x3333333333)
            .unwrap();
        assert_eq!(buf, [0x44; 0x20]);
    }

    #[test]
    fn single_block_with_little_endian_counter_tweak() {
        let codec = XtsCodec::new(&key_00_to_1f());
        let plain: [u8; 0x10] = core::array::from_fn(|i| i as u8);
        let cipher = hex_str_to_array::<0x10>("17913bf4f31362fa9006c28e815e2237").unwrap();

        let mut tweak = [0; 0x10];
        tweak[0] = 1;
        assert_eq!(DefaultTweak::get_tweak(1), tweak);

        let mut buf = cipher;
        codec.decrypt_unit(&mut buf, tweak).unwrap();
        assert_eq!(buf, plain);

        let mut buf = cipher;
        codec.decrypt_sectors::<DefaultTweak>(&mut buf, 0x10, 1).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn counter_round_trip_with_nintendo_tweak() {
        let codec = XtsCodec::new(&key_00_to_1f());
        let plain: Vec<u8> = (0..0x600).map(|i| (i * 7) as u8).collect();

        let mut buf = plain.clone();
        codec
            .encrypt_sectors::<NintendoTweak>(&mut buf, SECTOR_SIZE, 5)
            .unwrap();
        assert_ne!(buf, plain);

        // every sector decrypts on its own as long as its number is right
        let mut middle = buf[SECTOR_SIZE..][..SECTOR_SIZE].to_vec();
        codec
            .decrypt_sectors::<NintendoTweak>(&mut middle, SECTOR_SIZE, 6)
            .unwrap();
        assert_eq!(middle, plain[SECTOR_SIZE..][..SECTOR_SIZE]);

        codec
            .decrypt_sectors::<NintendoTweak>(&mut buf, SECTOR_SIZE, 5)
            .unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn rejects_partial_sectors() {
        let codec = XtsCodec::new(&key_00_to_1f());
        let mut buf = [0; 0x210];
        assert_eq!(
            codec.decrypt_sectors::<NintendoTweak>(&mut buf, SECTOR_SIZE, 0),
            Err(CryptoError::Misaligned {
                what: "xts buffer length",
                value: 0x210,
                align: 0x200
            })
        );
        assert!(codec
            .decrypt_doubling(&mut buf[..0x18], &[0; 0x10], 0x10, 0)
            .is_err());
    }

    #[test]
    fn gf128_doubling() {
        let mut t = [0; 0x10];
        t[0] = 0x01;
        gf128_mul_alpha(&mut t);
        assert_eq!(t[0], 0x02);
        assert!(t[1..].iter().all(|b| *b == 0));

        let mut t = [0; 0x10];
        t[0] = 0x80;
        gf128_mul_alpha(&mut t);
        assert_eq!(t[0], 0x87);
        assert!(t[1..].iter().all(|b| *b == 0));

        let mut t = [0; 0x10];
        t[0] = 0x01;
        for _ in 0..7 {
            gf128_mul_alpha(&mut t);
        }
        assert_eq!(t[0], 0x80);
        gf128_mul_alpha(&mut t);
        assert_eq!(t[0], 0x87);
    }

    #[test]
    fn gf128_power_matches_repeated_doubling() {
        let start: [u8; 0x10] = core::array::from_fn(|i| (i as u8).wrapping_mul(0x3b) ^ 0xa5);

        let mut t = start;
        for n in 0..=300u64 {
            assert_eq!(gf128_mul_alpha_pow(&start, n), t, "power {n}");
            gf128_mul_alpha(&mut t);
        }

        let mut one = [0; 0x10];
        one[0] = 1;
        assert_eq!(gf128_mul_alpha_pow(&one, 8)[0], 0x87);
    }

    #[test]
    fn doubling_round_trip_and_sector_independence() {
        let codec = XtsCodec::from_halves(&[0x5a; 0x10], &[0xa5; 0x10]);
        let initial = [0x42; 0x10];
        let plain: Vec<u8> = (0..0x800).map(|i| (i % 251) as u8).collect();

        let mut buf = plain.clone();
        codec
            .encrypt_doubling(&mut buf, &initial, SECTOR_SIZE, 0)
            .unwrap();
        assert_ne!(buf, plain);

        let mut last = buf[0x600..].to_vec();
        codec
            .decrypt_doubling(&mut last, &initial, SECTOR_SIZE, 3)
            .unwrap();
        assert_eq!(last, plain[0x600..]);

        codec
            .decrypt_doubling(&mut buf, &initial, SECTOR_SIZE, 0)
            .unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn sector_tweaks_advance_from_a_late_first_sector() {
        let codec = XtsCodec::from_halves(&[0x17; 0x10], &[0x71; 0x10]);
        let initial = [0x0c; 0x10];
        let first = 0x1_0000_0fffu64;
        let plain: Vec<u8> = (0..4 * SECTOR_SIZE).map(|i| (i * 7) as u8).collect();

        let mut whole = plain.clone();
        codec
            .encrypt_doubling(&mut whole, &initial, SECTOR_SIZE, first)
            .unwrap();

        // every sector on its own, its tweak computed directly from its number
        for (i, sector) in whole.chunks_exact(SECTOR_SIZE).enumerate() {
            let mut one = sector.to_vec();
            codec
                .decrypt_doubling(&mut one, &initial, SECTOR_SIZE, first + i as u64)
                .unwrap();
            assert_eq!(one, plain[i * SECTOR_SIZE..][..SECTOR_SIZE], "sector {i}");
        }
    }

    #[test]
    fn conventions_differ() {
        let codec = XtsCodec::new(&key_00_to_1f());
        let mut a = [0u8; SECTOR_SIZE];
        let mut b = [0u8; SECTOR_SIZE];
        codec
            .encrypt_sectors::<NintendoTweak>(&mut a, SECTOR_SIZE, 0)
            .unwrap();
        codec
            .encrypt_doubling(&mut b, &NintendoTweak::get_tweak(0), SECTOR_SIZE, 0)
            .unwrap();

        // same first block (same encrypted tweak), diverging after the first doubling
        assert_eq!(a[..0x10], b[..0x10]);
        assert_ne!(a[0x10..], b[0x10..]);
    }

    #[test]
    fn storage_needs_sector_alignment() -> HacResult<()> {
        let codec = XtsCodec::new(&key_00_to_1f());
        let initial = [0; 0x10];
        let plain = vec![0xab; 0x400];
        let mut enc = plain.clone();
        codec.encrypt_doubling(&mut enc, &initial, SECTOR_SIZE, 0)?;

        let storage = AesXtsStorage::new(VecStorage::new(enc), codec, initial).into_storage();
        assert_eq!(storage.read_vec(0x200, 0x200)?, plain[0x200..]);
        assert!(storage.read_vec(0x10, 0x200).is_err());

        Ok(())
    }
}
