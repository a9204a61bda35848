// FAT12/FAT16 on-disk constants

// Boot sector
pub const BOOT_SECTOR_SIZE: usize = 512;
pub const BOOT_SIGNATURE: u16 = 0xAA55;
pub const BOOT_SIGNATURE_OFFSET: u64 = 0x1FE;
pub const BOOT_CODE_SIZE: usize = 456;
pub const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
pub const JUMP_BOOT: [u8; 3] = [0xE9, 0x00, 0x00];

// Cluster count thresholds (inclusive upper bounds)
pub const FAT12_MAX_CLUSTERS: u64 = 4085;
pub const FAT16_MAX_CLUSTERS: u64 = 65525;

// FAT[0] high bits, OR'd with the media descriptor
pub const FAT12_MEDIA_HIGH: u16 = 0x0F00;
pub const FAT16_MEDIA_HIGH: u16 = 0xFF00;

// End-of-chain values written to FAT[1] at format time
pub const FAT12_EOC: u16 = 0x0FFF;
pub const FAT16_EOC: u16 = 0xFFFF;

pub const FREE_CLUSTER: u16 = 0x0000;
pub const FIRST_DATA_CLUSTER: u32 = 2;

// Directory entries
pub const DIR_ENTRY_SIZE: usize = 32;
pub const ENTRY_END: u8 = 0x00;
pub const ENTRY_DELETED: u8 = 0xE5;
pub const ENTRY_E5_ESCAPE: u8 = 0x05;
pub const SHORT_NAME_LEN: usize = 11;
pub const SHORT_BASE_LEN: usize = 8;
pub const SHORT_EXT_LEN: usize = 3;

// Directories are limited to 65536 entries
pub const MAX_DIRECTORY_BYTES: u32 = 0x200000;

// 2000-01-01
pub const DEFAULT_DATE: u16 = 0x2821;

// Long file names
pub const LFN_CHARS_PER_ENTRY: usize = 13;
pub const LFN_NAME_BYTES: usize = LFN_CHARS_PER_ENTRY * 2;
pub const LFN_LAST_ENTRY: u8 = 0x40;

// A numeric tail (~N) may use at most 6 digits
pub const MAX_SUFFIX_DIGITS: usize = 6;

// Media descriptors
pub const MEDIA_FIXED: u8 = 0xF8;
