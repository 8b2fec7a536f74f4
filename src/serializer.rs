use sha2::{Digest, Sha512};

use crate::types::{AccountId, Hash256};

/// Append-only byte buffer producing the canonical big-endian layouts the
/// engine hashes over. Two independent builds of the same logical value must
/// yield identical bytes, so every width is fixed and no padding is emitted.
#[derive(Clone, Debug, Default)]
pub struct Serializer {
    buf: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn add8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn add16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn add32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn add64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn add160(&mut self, value: &AccountId) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn add256(&mut self, value: &Hash256) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn add_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed variable bytes (u16 big-endian length).
    pub fn add_var_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= u16::MAX as usize);
        self.add16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// First 32 bytes of SHA-512 over the accumulated buffer.
    pub fn sha512_half(&self) -> Hash256 {
        sha512_half(&self.buf)
    }
}

/// First 32 bytes of SHA-512 over `data`.
pub fn sha512_half(data: &[u8]) -> Hash256 {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    Hash256::from_bytes(out)
}
