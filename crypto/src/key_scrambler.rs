// Normal-key derivation of the DSi AES engine
//
// key = ROL128((swap_lanes(keyX ^ keyY) + C), 42), emitted little-endian.

use crate::aes_ctr::{Block, BLOCK_SIZE};

/// keyY used for the ES (ticket/title content) key slot
pub const ES_KEY_Y: u128 = 0x8B5A_CCE5_72C9_D056_DCE8_179C_A936_1239;
/// keyY used for the NAND key slot
pub const NAND_KEY_Y: u128 = 0x0AB9_DC76_BD4D_C4D3_202D_DD1D_E1A0_0005;

const SCRAMBLE_CONSTANT: u128 = 0xFFFE_FB4E_2959_0258_2A68_0F5F_1A4F_3E79;
const ROTATION: u32 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    Es,
    Nand,
}

impl KeyPurpose {
    pub fn key_y(self) -> u128 {
        match self {
            KeyPurpose::Es => ES_KEY_Y,
            KeyPurpose::Nand => NAND_KEY_Y,
        }
    }
}

/// Reverse the order of the four 32-bit lanes
fn swap_lanes(value: u128) -> u128 {
    (0..4).fold(0u128, |acc, lane| {
        let word = (value >> (32 * lane)) & 0xFFFF_FFFF;
        acc | (word << (96 - 32 * lane))
    })
}

/// Derive the normal key for `key_x` in the given slot
pub fn scramble(key_x: u128, purpose: KeyPurpose) -> Block {
    let mixed = swap_lanes(key_x ^ purpose.key_y())
        .wrapping_add(SCRAMBLE_CONSTANT)
        .rotate_left(ROTATION);
    mixed.to_le_bytes()
}

/// `value` in the engine's register layout, the form [`scramble_bytes`] expects
pub fn register_layout(value: u128) -> Block {
    swap_lanes(value).to_le_bytes()
}

/// Byte-array form of [`scramble`], operating on register-layout inputs.
pub fn scramble_bytes(key_x: &Block, key_y: &Block) -> Block {
    let constant = SCRAMBLE_CONSTANT.to_be_bytes();

    let mut sum = [0u8; BLOCK_SIZE];
    let mut carry = 0u16;
    for i in 0..BLOCK_SIZE {
        let total = u16::from(key_x[i] ^ key_y[i]) + u16::from(constant[BLOCK_SIZE - 1 - i]) + carry;
        sum[i] = total as u8;
        carry = total >> 8;
    }

    rotate_left_bytes(&sum, ROTATION as usize)
}

/// 128-bit left rotation over a little-endian byte array
fn rotate_left_bytes(value: &Block, bits: usize) -> Block {
    let coarse = bits / 8;
    let fine = bits % 8;

    let mut shifted = [0u8; BLOCK_SIZE];
    for (i, byte) in shifted.iter_mut().enumerate() {
        *byte = value[(i + BLOCK_SIZE - coarse) % BLOCK_SIZE];
    }
    if fine == 0 {
        return shifted;
    }

    let mut out = [0u8; BLOCK_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        let previous = shifted[(i + BLOCK_SIZE - 1) % BLOCK_SIZE];
        *byte = (shifted[i] << fine) | (previous >> (8 - fine));
    }
    out
}

/// ES keyX for a console
pub fn es_key_x(console_id: u64) -> u128 {
    let hi = console_id >> 32;
    let lo = console_id & 0xFFFF_FFFF;
    (0x4E00_004A_4A00_004Eu128 << 64) | u128::from(((hi ^ 0xC80C_4B72) << 32) | lo)
}

/// NAND keyX for a console
pub fn nand_key_x(console_id: u64) -> u128 {
    let hi = console_id >> 32;
    let lo = console_id & 0xFFFF_FFFF;
    let upper = (lo << 32) | (lo ^ 0x24EE_6906);
    let lower = ((hi ^ 0xE65B_601D) << 32) | hi;
    (u128::from(upper) << 64) | u128::from(lower)
}
