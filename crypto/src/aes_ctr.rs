// AES-CTR in the byte order of the DSi's AES engine
//
// Keys and counters are byte-reversed once at construction and every
// keystream block is reversed on output

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

pub const BLOCK_SIZE: usize = 16;

pub type Block = [u8; BLOCK_SIZE];

/// Copy of `bytes` in reverse order
pub(crate) fn reversed(bytes: &Block) -> Block {
    let mut out = *bytes;
    out.reverse();
    out
}

/// AES-128 keyed with the engine's reversed key
pub(crate) fn engine_cipher(key: &Block) -> Aes128 {
    Aes128::new(GenericArray::from_slice(&reversed(key)))
}

/// One raw AES-128-ECB block encryption
pub(crate) fn encrypt_block(cipher: &Aes128, block: &Block) -> Block {
    let mut buffer = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buffer);
    let mut out = [0u8; BLOCK_SIZE];
    out.copy_from_slice(&buffer);
    out
}

/// Counter-mode keystream with reflected key, counter and output.
///
/// Each block consumes one counter value; the counter is a 128-bit
/// big-endian integer in its stored (already reversed) form.
#[derive(Clone)]
pub struct ReflectedCtr {
    cipher: Aes128,
    counter: Block,
}

impl ReflectedCtr {
    pub fn new(key: &Block, iv: &Block) -> Self {
        Self {
            cipher: engine_cipher(key),
            counter: reversed(iv),
        }
    }

    /// Seed from an integer counter, as used for sector-offset seeking
    pub fn from_counter(key: &Block, counter: u128) -> Self {
        Self {
            cipher: engine_cipher(key),
            counter: counter.to_be_bytes(),
        }
    }

    /// Stored counter, most significant byte first
    pub fn counter(&self) -> Block {
        self.counter
    }

    pub fn set_counter(&mut self, counter: Block) {
        self.counter = counter;
    }

    fn increment(&mut self) {
        for byte in self.counter.iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }

    /// Keystream block for the current counter without advancing
    pub fn peek_keystream(&self) -> Block {
        reversed(&encrypt_block(&self.cipher, &self.counter))
    }

    /// Next keystream block
    pub fn keystream_block(&mut self) -> Block {
        let stream = self.peek_keystream();
        self.increment();
        stream
    }

    /// XOR one block with the keystream. Encryption and decryption are the same call.
    pub fn transform_block(&mut self, input: &Block) -> Block {
        let stream = self.keystream_block();
        let mut output = [0u8; BLOCK_SIZE];
        for (out, (s, i)) in output.iter_mut().zip(stream.iter().zip(input)) {
            *out = s ^ i;
        }
        output
    }

    /// Transform `data` in place, one counter value per 16 bytes (a short
    /// final chunk still consumes a whole block)
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let stream = self.keystream_block();
            for (byte, s) in chunk.iter_mut().zip(stream.iter()) {
                *byte ^= s;
            }
        }
    }
}
