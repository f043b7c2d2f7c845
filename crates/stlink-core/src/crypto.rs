//! Payload and key obfuscation.
//!
//! The probe bootloader expects firmware blocks and the session key to be
//! run through AES-128 in ECB mode. Protocol code only sees the [`Cipher`]
//! trait so it can be exercised with a deterministic fake.
//!
//! Bytes go into the block cipher in wire order, with no 32-bit word
//! swapping around it. Not yet checked against a captured probe exchange.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

pub const KEY_SIZE: usize = 16;
pub const BLOCK_SIZE: usize = 16;

/// In-place block transform keyed by a 16-byte key.
pub trait Cipher: Send + Sync {
    fn encrypt_in_place(&self, key: &[u8; KEY_SIZE], data: &mut [u8]);
}

/// AES-128 ECB over every complete block; a trailing partial block is left as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct StlinkCipher;

impl Cipher for StlinkCipher {
    fn encrypt_in_place(&self, key: &[u8; KEY_SIZE], data: &mut [u8]) {
        let aes = Aes128::new(GenericArray::from_slice(key));
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            aes.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fips197_vector() {
        let key: [u8; 16] = core::array::from_fn(|i| i as u8);
        let mut data = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        StlinkCipher.encrypt_in_place(&key, &mut data);
        assert_eq!(
            data,
            [
                0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4,
                0xC5, 0x5A
            ]
        );
    }

    #[test]
    fn test_blocks_are_independent() {
        let key = *b"I am key, wawawa";
        let mut data = [0x5Au8; 32];
        StlinkCipher.encrypt_in_place(&key, &mut data);
        assert_eq!(data[..16], data[16..]);
        assert_ne!(data[..16], [0x5A; 16]);
    }

    #[test]
    fn test_partial_block_untouched() {
        let key = *b" found...STlink ";
        let mut data = [0xA5u8; 21];
        StlinkCipher.encrypt_in_place(&key, &mut data);
        assert_ne!(data[..16], [0xA5; 16]);
        assert_eq!(data[16..], [0xA5; 5]);
    }
}
