// Single-segment AES-CCM as implemented by the DSi's AES engine
//
// No associated data, at most one 3-byte length field, and the same byte
// reflection as ReflectedCtr applied to every MAC input and output.

use aes::Aes128;

use crate::aes_ctr::{encrypt_block, engine_cipher, reversed, Block, ReflectedCtr, BLOCK_SIZE};

pub const NONCE_SIZE: usize = 12;

/// Largest padded payload the 3-byte length field can describe
pub const MAX_PAYLOAD: usize = 0x00FF_FFF0;

pub struct Ccm {
    cipher: Aes128,
    mac: Block,
    s0: Block,
    ctr: ReflectedCtr,
}

impl Ccm {
    /// Set up the MAC accumulator (B0) and the counter stream for one payload.
    ///
    /// `payload_len` must not exceed [`MAX_PAYLOAD`]; callers enforce their own,
    /// smaller limits before getting here.
    pub fn new(key: &Block, nonce: &[u8; NONCE_SIZE], mac_len: usize, payload_len: usize) -> Self {
        let cipher = engine_cipher(key);
        let padded_len = (payload_len + 15) & !15;

        let mut b0 = [0u8; BLOCK_SIZE];
        b0[0] = ((((mac_len.saturating_sub(2)) / 2) as u8) << 3) | 2;
        for i in 0..NONCE_SIZE {
            b0[i + 1] = nonce[NONCE_SIZE - 1 - i];
        }
        b0[13] = (padded_len >> 16) as u8;
        b0[14] = (padded_len >> 8) as u8;
        b0[15] = padded_len as u8;
        let mac = encrypt_block(&cipher, &b0);

        let mut counter = [0u8; BLOCK_SIZE];
        counter[0] = 2;
        for i in 0..NONCE_SIZE {
            counter[i + 1] = nonce[NONCE_SIZE - 1 - i];
        }
        // the CTR reverses its iv, so hand it the block back to front
        let mut ctr = ReflectedCtr::new(key, &reversed(&counter));
        let s0 = ctr.keystream_block();

        Self { cipher, mac, s0, ctr }
    }

    fn absorb(&mut self, plain: &Block) -> Block {
        for (i, byte) in self.mac.iter_mut().enumerate() {
            *byte ^= plain[BLOCK_SIZE - 1 - i];
        }
        self.mac = encrypt_block(&self.cipher, &self.mac);

        let mut tag = [0u8; BLOCK_SIZE];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = self.mac[BLOCK_SIZE - 1 - i] ^ self.s0[i];
        }
        tag
    }

    /// MAC then encrypt one block; returns the ciphertext and the running tag
    pub fn encrypt_block(&mut self, plain: &Block) -> (Block, Block) {
        let tag = self.absorb(plain);
        (self.ctr.transform_block(plain), tag)
    }

    /// Decrypt then MAC one block; returns the plaintext and the running tag
    pub fn decrypt_block(&mut self, cipher: &Block) -> (Block, Block) {
        let plain = self.ctr.transform_block(cipher);
        let tag = self.absorb(&plain);
        (plain, tag)
    }

    /// Encrypt a whole payload. A short tail is zero-padded for the MAC and
    /// truncated in the output.
    pub fn encrypt(mut self, plaintext: &[u8]) -> (Vec<u8>, Block) {
        let mut output = Vec::with_capacity(plaintext.len());
        let mut rest = plaintext;

        while rest.len() > BLOCK_SIZE {
            let (head, tail) = rest.split_at(BLOCK_SIZE);
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(head);
            output.extend_from_slice(&self.encrypt_block(&block).0);
            rest = tail;
        }

        let mut block = [0u8; BLOCK_SIZE];
        block[..rest.len()].copy_from_slice(rest);
        let (cipher, tag) = self.encrypt_block(&block);
        output.extend_from_slice(&cipher[..rest.len()]);

        (output, tag)
    }

    /// Decrypt a whole payload and return the plaintext with the computed tag.
    /// Comparing the tag is up to the caller.
    pub fn decrypt(mut self, ciphertext: &[u8]) -> (Vec<u8>, Block) {
        let mut output = Vec::with_capacity(ciphertext.len());
        let mut rest = ciphertext;

        while rest.len() > BLOCK_SIZE {
            let (head, tail) = rest.split_at(BLOCK_SIZE);
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(head);
            output.extend_from_slice(&self.decrypt_block(&block).0);
            rest = tail;
        }

        // Pad the tail with its own keystream so the padding decrypts to zeros
        let mut block = self.ctr.peek_keystream();
        block[..rest.len()].copy_from_slice(rest);
        let (plain, tag) = self.decrypt_block(&block);
        output.extend_from_slice(&plain[..rest.len()]);

        (output, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: Block = [0x3Cu8; 16];
    const NONCE: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    #[test]
    fn test_round_trip_odd_length() {
        let data: Vec<u8> = (0..53u8).collect();
        let (cipher, tag) = Ccm::new(&KEY, &NONCE, 16, data.len()).encrypt(&data);
        assert_eq!(cipher.len(), data.len());
        assert_ne!(cipher, data);

        let (plain, check) = Ccm::new(&KEY, &NONCE, 16, data.len()).decrypt(&cipher);
        assert_eq!(plain, data);
        assert_eq!(check, tag);
    }

    #[test]
    fn test_round_trip_block_multiple() {
        let data = vec![0xA5u8; 64];
        let (cipher, tag) = Ccm::new(&KEY, &NONCE, 16, data.len()).encrypt(&data);
        let (plain, check) = Ccm::new(&KEY, &NONCE, 16, data.len()).decrypt(&cipher);
        assert_eq!(plain, data);
        assert_eq!(check, tag);
    }

    #[test]
    fn test_empty_payload() {
        let (cipher, tag) = Ccm::new(&KEY, &NONCE, 16, 0).encrypt(&[]);
        assert!(cipher.is_empty());
        let (plain, check) = Ccm::new(&KEY, &NONCE, 16, 0).decrypt(&[]);
        assert!(plain.is_empty());
        assert_eq!(check, tag);
    }

    #[test]
    fn test_tampered_ciphertext_changes_tag() {
        let data = vec![7u8; 40];
        let (mut cipher, tag) = Ccm::new(&KEY, &NONCE, 16, data.len()).encrypt(&data);
        cipher[20] ^= 0x01;
        let (_, check) = Ccm::new(&KEY, &NONCE, 16, data.len()).decrypt(&cipher);
        assert_ne!(check, tag);
    }

    #[test]
    fn test_nonce_changes_output() {
        let data = vec![0u8; 16];
        let (a, tag_a) = Ccm::new(&KEY, &NONCE, 16, 16).encrypt(&data);
        let mut other = NONCE;
        other[0] ^= 0xFF;
        let (b, tag_b) = Ccm::new(&KEY, &other, 16, 16).encrypt(&data);
        assert_ne!(a, b);
        assert_ne!(tag_a, tag_b);
    }
}
