//! Raw AES storages and codecs. They only accept block aligned accesses, wrap them
//! in a [`super::BlockBufferStorage`] for arbitrary offsets.

pub mod ctr;
pub mod xts;

pub const BLOCK_SIZE: usize = 0x10;

pub(crate) fn xor_block(block: &mut [u8], tweak: &[u8; BLOCK_SIZE]) {
    for (b, t) in block.iter_mut().zip(tweak) {
        *b ^= t;
    }
}
