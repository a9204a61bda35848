// Long filename (VFAT) fragments for FAT12/FAT16 directories

use byteorder::{ByteOrder, LittleEndian};

use super::constants::*;
use super::structures::FatAttributes;

/// Checksum of an 11-byte short name, stored in every fragment that belongs to it
pub fn lfn_checksum(short_name: &[u8; SHORT_NAME_LEN]) -> u8 {
    let mut sum = 0u8;
    for &byte in short_name {
        sum = ((sum >> 1) | (sum << 7)).wrapping_add(byte);
    }
    sum
}

/// One 32-byte long-name slot carrying up to 13 UTF-16 code units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfnFragment {
    /// 1-based position, with `LFN_LAST_ENTRY` set on the fragment holding the tail
    pub order: u8,
    pub checksum: u8,
    /// Raw name area: text, then a NUL if it ends early, then 0xFFFF padding
    pub units: [u16; LFN_CHARS_PER_ENTRY],
}

// Byte ranges of the three name pieces inside a slot
const NAME1: (usize, usize) = (1, 11);
const NAME2: (usize, usize) = (14, 26);
const NAME3: (usize, usize) = (28, 32);

impl LfnFragment {
    pub fn new(order: u8, checksum: u8, text: &[u16]) -> Self {
        let mut units = [0xFFFFu16; LFN_CHARS_PER_ENTRY];
        units[..text.len()].copy_from_slice(text);
        if text.len() < LFN_CHARS_PER_ENTRY {
            units[text.len()] = 0x0000;
        }
        Self { order, checksum, units }
    }

    pub fn sequence(&self) -> u8 {
        self.order & !LFN_LAST_ENTRY
    }

    pub fn is_last(&self) -> bool {
        self.order & LFN_LAST_ENTRY != 0
    }

    /// Code units up to the terminating NUL
    pub fn text(&self) -> &[u16] {
        let end = self
            .units
            .iter()
            .position(|&unit| unit == 0)
            .unwrap_or(LFN_CHARS_PER_ENTRY);
        &self.units[..end]
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut name = [0u8; LFN_NAME_BYTES];
        LittleEndian::write_u16_into(&self.units, &mut name);

        let mut slot = [0u8; DIR_ENTRY_SIZE];
        slot[0] = self.order;
        slot[NAME1.0..NAME1.1].copy_from_slice(&name[0..10]);
        slot[11] = FatAttributes::LONG_NAME;
        slot[12] = 0; // type
        slot[13] = self.checksum;
        slot[NAME2.0..NAME2.1].copy_from_slice(&name[10..22]);
        // bytes 26..28: first cluster, always zero
        slot[NAME3.0..NAME3.1].copy_from_slice(&name[22..26]);
        slot
    }

    pub fn from_bytes(slot: &[u8]) -> Self {
        let mut name = [0u8; LFN_NAME_BYTES];
        name[0..10].copy_from_slice(&slot[NAME1.0..NAME1.1]);
        name[10..22].copy_from_slice(&slot[NAME2.0..NAME2.1]);
        name[22..26].copy_from_slice(&slot[NAME3.0..NAME3.1]);

        let mut units = [0u16; LFN_CHARS_PER_ENTRY];
        LittleEndian::read_u16_into(&name, &mut units);

        Self {
            order: slot[0],
            checksum: slot[13],
            units,
        }
    }
}

/// Number of fragments needed to hold `name`
pub fn fragments_needed(name: &str) -> usize {
    let units = name.encode_utf16().count();
    ((units + LFN_CHARS_PER_ENTRY - 1) / LFN_CHARS_PER_ENTRY).max(1)
}

/// Split `name` into fragments, returned in on-disk order (tail fragment first)
pub fn build_lfn_fragments(name: &str, checksum: u8) -> Vec<LfnFragment> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = fragments_needed(name);

    let mut fragments: Vec<LfnFragment> = (0..count)
        .map(|index| {
            let start = index * LFN_CHARS_PER_ENTRY;
            let end = (start + LFN_CHARS_PER_ENTRY).min(units.len());
            let mut order = index as u8 + 1;
            if index + 1 == count {
                order |= LFN_LAST_ENTRY;
            }
            LfnFragment::new(order, checksum, &units[start.min(end)..end])
        })
        .collect();

    fragments.reverse();
    fragments
}

/// Reassemble a long name from fragments collected in on-disk order
pub fn combine_lfn_fragments(fragments: &[LfnFragment]) -> String {
    let units: Vec<u16> = fragments
        .iter()
        .rev()
        .flat_map(|fragment| fragment.text().iter().copied())
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_value() {
        assert_eq!(lfn_checksum(b"FILENAMETXT"), 0x3A);
    }

    #[test]
    fn test_fragment_layout() {
        let fragments = build_lfn_fragments("x.txt", 0xAB);
        assert_eq!(fragments.len(), 1);

        let slot = fragments[0].to_bytes();
        assert_eq!(slot[0], 0x41);
        assert_eq!(&slot[1..11], &[b'x', 0, b'.', 0, b't', 0, b'x', 0, b't', 0]);
        assert_eq!(slot[11], 0x0F);
        assert_eq!(slot[12], 0);
        assert_eq!(slot[13], 0xAB);
        // NUL terminator, then 0xFFFF padding
        assert_eq!(&slot[14..18], &[0, 0, 0xFF, 0xFF]);
        assert!(slot[18..26].iter().all(|&b| b == 0xFF));
        assert_eq!(&slot[26..28], &[0, 0]);
        assert_eq!(&slot[28..32], &[0xFF; 4]);

        assert_eq!(LfnFragment::from_bytes(&slot), fragments[0]);
    }

    #[test]
    fn test_multi_fragment_order() {
        let name = "a really long file name.bin";
        let fragments = build_lfn_fragments(name, 0);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].order, 0x43);
        assert_eq!(fragments[1].order, 0x02);
        assert_eq!(fragments[2].order, 0x01);
        assert_eq!(combine_lfn_fragments(&fragments), name);
    }

    #[test]
    fn test_exact_multiple_of_thirteen() {
        let name = "abcdefghijklm";
        let fragments = build_lfn_fragments(name, 0);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].is_last());
        assert_eq!(fragments[0].order, 0x41);
        assert!(fragments[0].units.iter().all(|&unit| unit != 0 && unit != 0xFFFF));
        assert_eq!(combine_lfn_fragments(&fragments), name);

        let name = "abcdefghijklmnopqrstuvwxyz";
        let fragments = build_lfn_fragments(name, 0);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].order, 0x42);
        assert_eq!(fragments[1].order, 0x01);
        assert_eq!(combine_lfn_fragments(&fragments), name);
    }
}
