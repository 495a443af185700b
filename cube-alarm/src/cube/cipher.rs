//! GAN Gen3 frame encryption.
//!
//! Notifications and commands are AES-128 encrypted with a key and IV
//! salted by the cube's hardware address. Only the first and the last 16
//! bytes of a frame are enciphered, each as a single CBC block under the
//! same IV; the two blocks overlap on frames shorter than 32 bytes, so the
//! order of the two steps matters.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use super::protocol::FrameError;

const BLOCK: usize = 16;

const BASE_KEY: [u8; BLOCK] = [
    0x01, 0x02, 0x42, 0x28, 0x31, 0x91, 0x16, 0x07, 0x20, 0x05, 0x18, 0x54, 0x42, 0x11, 0x12, 0x53,
];
const BASE_IV: [u8; BLOCK] = [
    0x11, 0x03, 0x32, 0x28, 0x21, 0x01, 0x76, 0x27, 0x20, 0x95, 0x78, 0x14, 0x32, 0x12, 0x02, 0x43,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("cube address {0:?} is neither a MAC nor a UUID")]
    Format(String),
}

/// Session cipher for one cube.
#[derive(Clone)]
pub struct GanCipher {
    aes: Aes128,
    iv: [u8; BLOCK],
}

impl std::fmt::Debug for GanCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GanCipher").finish_non_exhaustive()
    }
}

/// Key and IV for the cube at `address`.
///
/// `address` is a MAC (`AA:BB:CC:DD:EE:FF`) or, where the platform hides
/// MACs, a 128-bit peripheral UUID whose first six bytes stand in for it.
pub fn derive_key_iv(address: &str) -> Result<([u8; BLOCK], [u8; BLOCK]), AddressError> {
    let clean: String = address.chars().filter(|c| !matches!(c, ':' | '-')).collect();
    if !clean.is_ascii() {
        return Err(AddressError::Format(address.to_string()));
    }
    let salt_hex = match clean.len() {
        12 => clean.as_str(),
        32 => &clean[..12],
        _ => return Err(AddressError::Format(address.to_string())),
    };
    let mut salt = hex::decode(salt_hex).map_err(|_| AddressError::Format(address.to_string()))?;
    salt.reverse();

    let mut key = BASE_KEY;
    let mut iv = BASE_IV;
    for (i, s) in salt.iter().enumerate() {
        // Modulo 255, not 256.
        key[i] = ((u16::from(BASE_KEY[i]) + u16::from(*s)) % 0xff) as u8;
        iv[i] = ((u16::from(BASE_IV[i]) + u16::from(*s)) % 0xff) as u8;
    }
    Ok((key, iv))
}

impl GanCipher {
    pub fn new(key: [u8; BLOCK], iv: [u8; BLOCK]) -> Self {
        Self {
            aes: Aes128::new(&GenericArray::from(key)),
            iv,
        }
    }

    pub fn for_address(address: &str) -> Result<Self, AddressError> {
        let (key, iv) = derive_key_iv(address)?;
        Ok(Self::new(key, iv))
    }

    /// Decrypt a notification: the trailing block first, then the leading.
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut out = frame.to_vec();
        let tail = check_len(&out)?;
        if let Some(tail) = tail {
            self.decrypt_block(&mut out[tail..]);
        }
        self.decrypt_block(&mut out[..BLOCK]);
        Ok(out)
    }

    /// Encrypt a command: the leading block first, then the trailing.
    pub fn encrypt(&self, frame: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut out = frame.to_vec();
        let tail = check_len(&out)?;
        self.encrypt_block(&mut out[..BLOCK]);
        if let Some(tail) = tail {
            self.encrypt_block(&mut out[tail..]);
        }
        Ok(out)
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let mut b = GenericArray::clone_from_slice(block);
        self.aes.decrypt_block(&mut b);
        for ((out, plain), iv) in block.iter_mut().zip(b.iter()).zip(self.iv.iter()) {
            *out = plain ^ iv;
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        for (byte, iv) in block.iter_mut().zip(self.iv.iter()) {
            *byte ^= iv;
        }
        let mut b = GenericArray::clone_from_slice(block);
        self.aes.encrypt_block(&mut b);
        block.copy_from_slice(&b);
    }
}

/// Offset of the trailing block, if the frame has one beyond the first.
fn check_len(frame: &[u8]) -> Result<Option<usize>, FrameError> {
    if frame.len() < BLOCK {
        return Err(FrameError::Ciphertext(frame.len()));
    }
    Ok((frame.len() > BLOCK).then(|| frame.len() - BLOCK))
}
