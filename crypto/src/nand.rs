// eMMC (NAND) image crypt
//
// The whole image is one CTR stream keyed by the console's NAND key; the
// counter for byte offset `o` is SHA1(CID)[0..16] as a little-endian integer
// plus o / 16.

use std::io::{ErrorKind, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use nandgen_core::{NandGenError, Result};
use sha1::{Digest, Sha1};

use crate::aes_ctr::{Block, ReflectedCtr, BLOCK_SIZE};
use crate::key_scrambler::{nand_key_x, scramble, KeyPurpose};

pub const CID_SIZE: usize = 16;
pub const NOCASH_FOOTER_SIZE: usize = 64;
const NOCASH_MAGIC: &[u8; 16] = b"DSi eMMC CID/CPU";

/// Bytes transformed per read in [`NandCrypto::crypt_stream`]
const STREAM_CHUNK: usize = 0x10000;

#[derive(Clone)]
pub struct NandCrypto {
    key: Block,
    base_counter: u128,
}

impl NandCrypto {
    pub fn new(cid: &[u8; CID_SIZE], console_id: u64) -> Self {
        let digest = Sha1::digest(cid);
        let mut counter = [0u8; BLOCK_SIZE];
        counter.copy_from_slice(&digest[..BLOCK_SIZE]);

        Self {
            key: scramble(nand_key_x(console_id), KeyPurpose::Nand),
            base_counter: u128::from_le_bytes(counter),
        }
    }

    pub fn key(&self) -> &Block {
        &self.key
    }

    pub fn base_counter(&self) -> u128 {
        self.base_counter
    }

    /// CTR positioned at a 16-byte aligned image offset
    pub fn cipher_at(&self, offset: u64) -> Result<ReflectedCtr> {
        if offset % BLOCK_SIZE as u64 != 0 {
            return Err(NandGenError::InvalidInput(format!(
                "NAND offset 0x{:X} is not 16-byte aligned",
                offset
            )));
        }
        let counter = self.base_counter.wrapping_add(u128::from(offset / BLOCK_SIZE as u64));
        Ok(ReflectedCtr::from_counter(&self.key, counter))
    }

    /// Encrypt or decrypt `data` in place as if it sat at `offset` in the image
    pub fn crypt_in_place(&self, data: &mut [u8], offset: u64) -> Result<()> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(NandGenError::InvalidInput(format!(
                "NAND data length {} is not a multiple of 16",
                data.len()
            )));
        }
        self.cipher_at(offset)?.apply_keystream(data);
        Ok(())
    }

    /// Transform everything readable from `src` into `dst`, starting at image
    /// offset `offset`. Returns the number of bytes written.
    pub fn crypt_stream<R: Read, W: Write>(&self, src: &mut R, dst: &mut W, offset: u64) -> Result<u64> {
        let mut ctr = self.cipher_at(offset)?;
        let mut buffer = vec![0u8; STREAM_CHUNK];
        let mut total = 0u64;

        loop {
            let filled = read_full(src, &mut buffer)?;
            if filled == 0 {
                break;
            }
            if filled % BLOCK_SIZE != 0 {
                return Err(NandGenError::InvalidInput(format!(
                    "NAND stream ends {} bytes past a 16-byte boundary",
                    filled % BLOCK_SIZE
                )));
            }

            ctr.apply_keystream(&mut buffer[..filled]);
            dst.write_all(&buffer[..filled])?;
            total += filled as u64;

            if filled < buffer.len() {
                break;
            }
        }

        debug!("NAND crypt: 0x{:X} bytes from offset 0x{:X}", total, offset);
        Ok(total)
    }
}

fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Trailer no$gba appends to eMMC dumps so it can decrypt them
pub fn nocash_footer(cid: &[u8; CID_SIZE], console_id: u64) -> [u8; NOCASH_FOOTER_SIZE] {
    let mut footer = [0u8; NOCASH_FOOTER_SIZE];
    footer[..16].copy_from_slice(NOCASH_MAGIC);
    footer[16..32].copy_from_slice(cid);
    LittleEndian::write_u64(&mut footer[32..40], console_id);
    footer
}
