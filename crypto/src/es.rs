// ES container: CCM-encrypted payload followed by a 32-byte footer
//
// footer = tag (16) || lower footer (16)
// lower footer, before CTR encryption: 0x3A, 12 zero bytes, 24-bit BE length.
// After encryption bytes 1..13 are overwritten with the nonce in clear.

use log::{debug, trace};
use nandgen_core::{NandGenError, Result};
use rand::Rng;

use crate::aes_ccm::{Ccm, NONCE_SIZE};
use crate::aes_ctr::{Block, ReflectedCtr, BLOCK_SIZE};
use crate::key_scrambler::{es_key_x, scramble, KeyPurpose};

pub const FOOTER_SIZE: usize = 32;
pub const MAC_SIZE: usize = 16;
pub const FOOTER_MARKER: u8 = 0x3A;
/// Largest payload a single container holds
pub const MAX_PAYLOAD_SIZE: usize = 0x20000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsFooter {
    pub mac: Block,
    pub nonce: [u8; NONCE_SIZE],
    pub length: usize,
}

impl EsFooter {
    fn lower_iv(nonce: &[u8; NONCE_SIZE]) -> Block {
        let mut iv = [0u8; BLOCK_SIZE];
        iv[1..1 + NONCE_SIZE].copy_from_slice(nonce);
        iv
    }

    pub fn to_bytes(&self, key: &Block) -> [u8; FOOTER_SIZE] {
        let mut lower = [0u8; BLOCK_SIZE];
        lower[0] = FOOTER_MARKER;
        lower[13] = (self.length >> 16) as u8;
        lower[14] = (self.length >> 8) as u8;
        lower[15] = self.length as u8;

        let mut encrypted = ReflectedCtr::new(key, &Self::lower_iv(&self.nonce)).transform_block(&lower);
        encrypted[1..1 + NONCE_SIZE].copy_from_slice(&self.nonce);

        let mut footer = [0u8; FOOTER_SIZE];
        footer[..MAC_SIZE].copy_from_slice(&self.mac);
        footer[MAC_SIZE..].copy_from_slice(&encrypted);
        footer
    }

    pub fn from_bytes(key: &Block, footer: &[u8; FOOTER_SIZE]) -> Result<Self> {
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&footer[..MAC_SIZE]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&footer[MAC_SIZE + 1..MAC_SIZE + 1 + NONCE_SIZE]);

        let mut encrypted = [0u8; BLOCK_SIZE];
        encrypted.copy_from_slice(&footer[MAC_SIZE..]);
        let lower = ReflectedCtr::new(key, &Self::lower_iv(&nonce)).transform_block(&encrypted);

        if lower[0] != FOOTER_MARKER {
            return Err(NandGenError::FooterAuthenticationFailed(format!(
                "expected 0x{:02X} but found 0x{:02X}",
                FOOTER_MARKER, lower[0]
            )));
        }

        let length = (usize::from(lower[13]) << 16) | (usize::from(lower[14]) << 8) | usize::from(lower[15]);
        Ok(Self { mac, nonce, length })
    }
}

/// Encrypts and decrypts ES containers under one AES key
#[derive(Clone)]
pub struct EsContainer {
    key: Block,
}

impl EsContainer {
    pub fn new(key: Block) -> Self {
        Self { key }
    }

    /// Container keyed with the ES key scrambled from a console id
    pub fn for_console(console_id: u64) -> Self {
        Self::new(scramble(es_key_x(console_id), KeyPurpose::Es))
    }

    pub fn key(&self) -> &Block {
        &self.key
    }

    /// Encrypt under a fresh random nonce
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce[..]);
        self.encrypt_with_nonce(data, &nonce)
    }

    pub fn encrypt_with_nonce(&self, data: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(NandGenError::PayloadTooLarge(data.len()));
        }

        let (mut output, mac) = Ccm::new(&self.key, nonce, MAC_SIZE, data.len()).encrypt(data);
        let footer = EsFooter {
            mac,
            nonce: *nonce,
            length: data.len(),
        };
        output.extend_from_slice(&footer.to_bytes(&self.key));

        debug!("ES encrypted {} bytes", data.len());
        Ok(output)
    }

    /// Decrypt and authenticate. No plaintext is returned unless both the
    /// footer and the MAC check out.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < FOOTER_SIZE {
            return Err(NandGenError::InvalidInput(format!(
                "ES container of {} bytes is shorter than its footer",
                data.len()
            )));
        }
        let payload_len = data.len() - FOOTER_SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(NandGenError::PayloadTooLarge(payload_len));
        }

        let (payload, footer_bytes) = data.split_at(payload_len);
        let mut raw_footer = [0u8; FOOTER_SIZE];
        raw_footer.copy_from_slice(footer_bytes);
        let footer = EsFooter::from_bytes(&self.key, &raw_footer)?;

        if footer.length != payload_len {
            return Err(NandGenError::FooterAuthenticationFailed(format!(
                "footer records {} bytes but {} are present",
                footer.length, payload_len
            )));
        }

        let (plain, mac) = Ccm::new(&self.key, &footer.nonce, MAC_SIZE, payload_len).decrypt(payload);
        if mac != footer.mac {
            trace!("expected MAC {:02x?}, computed {:02x?}", footer.mac, mac);
            return Err(NandGenError::MacMismatch);
        }

        debug!("ES decrypted {} bytes", payload_len);
        Ok(plain)
    }
}
