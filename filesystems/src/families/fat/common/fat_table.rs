// In-memory file allocation table for FAT12 and FAT16
// Entries are kept as u16 regardless of width and packed on the way to disk

use nandgen_core::{NandGenError, Result};

use super::constants::*;
use super::structures::FatType;

/// The allocation table of a mounted volume.
///
/// The end-of-chain sentinel is whatever FAT[1] holds on disk, not a fixed
/// constant, so it is captured once at decode/format time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    fat_type: FatType,
    entries: Vec<u16>,
    end_of_chain: u16,
    byte_len: usize,
    allocation_limit: u32,
}

/// Number of entries that fit in `byte_len` bytes of table
fn entry_capacity(fat_type: FatType, byte_len: usize) -> usize {
    match fat_type {
        FatType::Fat12 => byte_len * 2 / 3,
        FatType::Fat16 => byte_len / 2,
    }
}

impl FatTable {
    /// Fresh table for a newly formatted volume
    pub fn formatted(fat_type: FatType, byte_len: usize, media: u8) -> Result<Self> {
        let capacity = entry_capacity(fat_type, byte_len);
        if capacity < FIRST_DATA_CLUSTER as usize {
            return Err(NandGenError::InvalidInput(format!(
                "FAT of {} bytes cannot hold the reserved entries",
                byte_len
            )));
        }

        let mut entries = vec![FREE_CLUSTER; capacity];
        entries[0] = fat_type.media_entry(media);
        entries[1] = fat_type.end_of_chain();

        Ok(Self {
            fat_type,
            end_of_chain: entries[1],
            allocation_limit: capacity as u32,
            entries,
            byte_len,
        })
    }

    /// Unpack a table read from disk
    pub fn decode(fat_type: FatType, bytes: &[u8]) -> Result<Self> {
        let capacity = entry_capacity(fat_type, bytes.len());
        let mut entries = Vec::with_capacity(capacity);

        match fat_type {
            FatType::Fat16 => {
                for pair in bytes.chunks_exact(2) {
                    entries.push(u16::from_le_bytes([pair[0], pair[1]]));
                }
            }
            FatType::Fat12 => {
                for index in 0..capacity {
                    let offset = index * 3 / 2;
                    if offset + 1 >= bytes.len() {
                        break;
                    }
                    let value = if index % 2 == 0 {
                        // even entries fill the first byte and the low nibble of the second
                        bytes[offset] as u16 | ((bytes[offset + 1] as u16 & 0x0F) << 8)
                    } else {
                        // odd entries fill the high nibble of the first byte and all of the second
                        (bytes[offset] as u16 >> 4) | ((bytes[offset + 1] as u16) << 4)
                    };
                    entries.push(value);
                }
            }
        }

        if entries.len() < FIRST_DATA_CLUSTER as usize {
            return Err(NandGenError::InvalidInput("FAT is too small to be valid".to_string()));
        }

        Ok(Self {
            fat_type,
            end_of_chain: entries[1],
            allocation_limit: entries.len() as u32,
            entries,
            byte_len: bytes.len(),
        })
    }

    /// Pack the table into exactly one FAT copy's worth of bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.byte_len];

        match self.fat_type {
            FatType::Fat16 => {
                for (slot, value) in bytes.chunks_exact_mut(2).zip(&self.entries) {
                    slot.copy_from_slice(&value.to_le_bytes());
                }
            }
            FatType::Fat12 => {
                for (index, &value) in self.entries.iter().enumerate() {
                    let offset = index * 3 / 2;
                    if offset + 1 >= bytes.len() {
                        break;
                    }
                    if index % 2 == 0 {
                        bytes[offset] = value as u8;
                        bytes[offset + 1] =
                            (bytes[offset + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
                    } else {
                        bytes[offset] = (bytes[offset] & 0x0F) | ((value as u8 & 0x0F) << 4);
                        bytes[offset + 1] = (value >> 4) as u8;
                    }
                }
            }
        }

        bytes
    }

    /// Restrict allocation to clusters that exist in the data region.
    ///
    /// The legacy sizing rule over-provisions the table, so its tail entries
    /// describe clusters past the end of the volume.
    pub fn limit_to_data_clusters(&mut self, data_clusters: u32) {
        let limit = data_clusters.saturating_add(FIRST_DATA_CLUSTER);
        self.allocation_limit = limit.min(self.entries.len() as u32);
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn end_of_chain(&self) -> u16 {
        self.end_of_chain
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn allocation_limit(&self) -> u32 {
        self.allocation_limit
    }

    pub fn get(&self, index: u32) -> Option<u16> {
        self.entries.get(index as usize).copied()
    }

    pub fn set(&mut self, index: u32, value: u16) -> Result<()> {
        let slot = self
            .entries
            .get_mut(index as usize)
            .ok_or_else(|| {
                NandGenError::InvalidInput(format!("FAT index {} out of range", index))
            })?;
        *slot = value;
        Ok(())
    }

    pub fn is_free(&self, index: u32) -> bool {
        self.get(index) == Some(FREE_CLUSTER)
    }

    /// Number of allocatable clusters still marked free
    pub fn free_clusters(&self) -> usize {
        (FIRST_DATA_CLUSTER..self.allocation_limit)
            .filter(|&index| self.is_free(index))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_reserved_entries() {
        let fat16 = FatTable::formatted(FatType::Fat16, 512, 0xF8).unwrap();
        assert_eq!(fat16.len(), 256);
        assert_eq!(fat16.get(0), Some(0xFFF8));
        assert_eq!(fat16.end_of_chain(), 0xFFFF);

        let fat12 = FatTable::formatted(FatType::Fat12, 1536, 0xF8).unwrap();
        assert_eq!(fat12.len(), 1024);
        assert_eq!(fat12.get(0), Some(0x0FF8));
        assert_eq!(fat12.end_of_chain(), 0x0FFF);
    }

    #[test]
    fn test_fat12_packing_layout() {
        let mut table = FatTable::formatted(FatType::Fat12, 1536, 0xF8).unwrap();
        table.set(2, 0x003).unwrap();
        table.set(3, 0xFFF).unwrap();
        table.set(4, 0xABC).unwrap();
        table.set(5, 0x123).unwrap();

        let bytes = table.encode();
        // entries 0 and 1
        assert_eq!(&bytes[0..3], &[0xF8, 0xFF, 0xFF]);
        // entries 2 (0x003) and 3 (0xFFF)
        assert_eq!(&bytes[3..6], &[0x03, 0xF0, 0xFF]);
        // entries 4 (0xABC) and 5 (0x123)
        assert_eq!(&bytes[6..9], &[0xBC, 0x3A, 0x12]);

        let decoded = FatTable::decode(FatType::Fat12, &bytes).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_fat16_little_endian_layout() {
        let mut table = FatTable::formatted(FatType::Fat16, 512, 0xF8).unwrap();
        table.set(2, 0x1234).unwrap();

        let bytes = table.encode();
        assert_eq!(&bytes[0..6], &[0xF8, 0xFF, 0xFF, 0xFF, 0x34, 0x12]);
        assert_eq!(FatTable::decode(FatType::Fat16, &bytes).unwrap(), table);
    }

    #[test]
    fn test_sentinel_read_from_disk() {
        let mut bytes = vec![0u8; 512];
        bytes[0..4].copy_from_slice(&[0xF8, 0xFF, 0xF8, 0xFF]);
        let table = FatTable::decode(FatType::Fat16, &bytes).unwrap();
        assert_eq!(table.end_of_chain(), 0xFFF8);
    }

    #[test]
    fn test_allocation_limit() {
        let mut table = FatTable::formatted(FatType::Fat16, 512, 0xF8).unwrap();
        assert_eq!(table.free_clusters(), 254);
        table.limit_to_data_clusters(10);
        assert_eq!(table.allocation_limit(), 12);
        assert_eq!(table.free_clusters(), 10);
    }
}
