// FAT12/FAT16 volume boot record and shared type definitions

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nandgen_core::{NandGenError, Result};
use serde::{Deserialize, Serialize};

use super::constants::*;

// ============================================================================
// FAT type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatType {
    Fat12,
    Fat16,
}

impl FatType {
    /// Pick the FAT width for a volume with `cluster_count` clusters
    pub fn from_cluster_count(cluster_count: u64) -> Result<Self> {
        if cluster_count <= FAT12_MAX_CLUSTERS {
            Ok(FatType::Fat12)
        } else if cluster_count <= FAT16_MAX_CLUSTERS {
            Ok(FatType::Fat16)
        } else {
            Err(NandGenError::UnsupportedVolumeSize(cluster_count))
        }
    }

    /// Value stored in FAT[0] for the given media descriptor
    pub fn media_entry(&self, media: u8) -> u16 {
        match self {
            FatType::Fat12 => FAT12_MEDIA_HIGH | media as u16,
            FatType::Fat16 => FAT16_MEDIA_HIGH | media as u16,
        }
    }

    /// Value stored in FAT[1] by a fresh format
    pub fn end_of_chain(&self) -> u16 {
        match self {
            FatType::Fat12 => FAT12_EOC,
            FatType::Fat16 => FAT16_EOC,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
        }
    }
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FAT{}", self.bits())
    }
}

// ============================================================================
// Directory entry attributes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatAttributes(pub u8);

impl FatAttributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    pub const LONG_NAME_MASK: u8 = Self::LONG_NAME | Self::DIRECTORY | Self::ARCHIVE;

    pub fn is_read_only(&self) -> bool { self.0 & Self::READ_ONLY != 0 }
    pub fn is_directory(&self) -> bool { self.0 & Self::DIRECTORY != 0 }
    pub fn is_archive(&self) -> bool { self.0 & Self::ARCHIVE != 0 }
    pub fn is_long_name(&self) -> bool { self.0 & Self::LONG_NAME_MASK == Self::LONG_NAME }
}

// ============================================================================
// Volume boot record
// ============================================================================

/// Overrides accepted by `FatVolume::format`.
///
/// Defaults are the values the DSi's own formatter writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VbrOptions {
    pub oem_name: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub media_descriptor: u8,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub volume_id: u32,
    pub volume_label: String,
}

impl Default for VbrOptions {
    fn default() -> Self {
        Self {
            oem_name: "TWL".to_string(),
            bytes_per_sector: 512,
            sectors_per_cluster: 32,
            reserved_sectors: 1,
            num_fats: 2,
            root_entries: 512,
            media_descriptor: MEDIA_FIXED,
            sectors_per_track: 0x20,
            num_heads: 0x10,
            volume_id: 0x12345678,
            volume_label: String::new(),
        }
    }
}

impl VbrOptions {
    /// Reject values that would make the layout arithmetic meaningless
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_sector == 0 || self.bytes_per_sector as usize % DIR_ENTRY_SIZE != 0 {
            return Err(NandGenError::InvalidInput(format!(
                "bytes per sector must be a non-zero multiple of {}: {}",
                DIR_ENTRY_SIZE, self.bytes_per_sector
            )));
        }
        if self.sectors_per_cluster == 0 {
            return Err(NandGenError::InvalidInput("sectors per cluster cannot be 0".to_string()));
        }
        if self.num_fats == 0 {
            return Err(NandGenError::InvalidInput("number of FATs cannot be 0".to_string()));
        }
        if self.reserved_sectors == 0 {
            return Err(NandGenError::InvalidInput("reserved sector count cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Space-pad (or cut) an ASCII string to a fixed-width field
fn padded<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [b' '; N];
    for (dst, src) in field.iter_mut().zip(text.bytes()) {
        *dst = src;
    }
    field
}

/// 512-byte volume boot record, laid out field by field as written to disk
#[derive(Clone, PartialEq, Eq)]
pub struct Vbr {
    pub jump_boot: [u8; 3],          // 0x00
    pub oem_name: [u8; 8],           // 0x03
    pub bytes_per_sector: u16,       // 0x0B
    pub sectors_per_cluster: u8,     // 0x0D
    pub reserved_sectors: u16,       // 0x0E
    pub num_fats: u8,                // 0x10
    pub root_entries: u16,           // 0x11
    pub total_sectors_16: u16,       // 0x13, always 0
    pub media_descriptor: u8,        // 0x15
    pub sectors_per_fat: u16,        // 0x16
    pub sectors_per_track: u16,      // 0x18
    pub num_heads: u16,              // 0x1A
    pub hidden_sectors: u32,         // 0x1C
    pub total_sectors: u32,          // 0x20
    pub drive_number: u8,            // 0x24
    pub reserved: u8,                // 0x25
    pub boot_signature: u8,          // 0x26
    pub volume_id: u32,              // 0x27
    pub volume_label: [u8; 11],      // 0x2B
    pub boot_code: [u8; BOOT_CODE_SIZE], // 0x36
    pub signature: u16,              // 0x1FE
}

impl Default for Vbr {
    fn default() -> Self {
        Self::from_options(&VbrOptions::default())
    }
}

impl Vbr {
    /// Build a VBR from format options; size-dependent fields are left zero
    pub fn from_options(options: &VbrOptions) -> Self {
        Self {
            jump_boot: JUMP_BOOT,
            oem_name: padded(&options.oem_name),
            bytes_per_sector: options.bytes_per_sector,
            sectors_per_cluster: options.sectors_per_cluster,
            reserved_sectors: options.reserved_sectors,
            num_fats: options.num_fats,
            root_entries: options.root_entries,
            total_sectors_16: 0,
            media_descriptor: options.media_descriptor,
            sectors_per_fat: 0,
            sectors_per_track: options.sectors_per_track,
            num_heads: options.num_heads,
            hidden_sectors: 0,
            total_sectors: 0,
            drive_number: 0,
            reserved: 0,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id: options.volume_id,
            volume_label: padded(&options.volume_label),
            boot_code: [0; BOOT_CODE_SIZE],
            signature: BOOT_SIGNATURE,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.jump_boot)?;
        writer.write_all(&self.oem_name)?;
        writer.write_u16::<LittleEndian>(self.bytes_per_sector)?;
        writer.write_u8(self.sectors_per_cluster)?;
        writer.write_u16::<LittleEndian>(self.reserved_sectors)?;
        writer.write_u8(self.num_fats)?;
        writer.write_u16::<LittleEndian>(self.root_entries)?;
        writer.write_u16::<LittleEndian>(self.total_sectors_16)?;
        writer.write_u8(self.media_descriptor)?;
        writer.write_u16::<LittleEndian>(self.sectors_per_fat)?;
        writer.write_u16::<LittleEndian>(self.sectors_per_track)?;
        writer.write_u16::<LittleEndian>(self.num_heads)?;
        writer.write_u32::<LittleEndian>(self.hidden_sectors)?;
        writer.write_u32::<LittleEndian>(self.total_sectors)?;
        writer.write_u8(self.drive_number)?;
        writer.write_u8(self.reserved)?;
        writer.write_u8(self.boot_signature)?;
        writer.write_u32::<LittleEndian>(self.volume_id)?;
        writer.write_all(&self.volume_label)?;
        writer.write_all(&self.boot_code)?;
        writer.write_u16::<LittleEndian>(self.signature)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut vbr = Vbr::default();
        reader.read_exact(&mut vbr.jump_boot)?;
        reader.read_exact(&mut vbr.oem_name)?;
        vbr.bytes_per_sector = reader.read_u16::<LittleEndian>()?;
        vbr.sectors_per_cluster = reader.read_u8()?;
        vbr.reserved_sectors = reader.read_u16::<LittleEndian>()?;
        vbr.num_fats = reader.read_u8()?;
        vbr.root_entries = reader.read_u16::<LittleEndian>()?;
        vbr.total_sectors_16 = reader.read_u16::<LittleEndian>()?;
        vbr.media_descriptor = reader.read_u8()?;
        vbr.sectors_per_fat = reader.read_u16::<LittleEndian>()?;
        vbr.sectors_per_track = reader.read_u16::<LittleEndian>()?;
        vbr.num_heads = reader.read_u16::<LittleEndian>()?;
        vbr.hidden_sectors = reader.read_u32::<LittleEndian>()?;
        vbr.total_sectors = reader.read_u32::<LittleEndian>()?;
        vbr.drive_number = reader.read_u8()?;
        vbr.reserved = reader.read_u8()?;
        vbr.boot_signature = reader.read_u8()?;
        vbr.volume_id = reader.read_u32::<LittleEndian>()?;
        reader.read_exact(&mut vbr.volume_label)?;
        reader.read_exact(&mut vbr.boot_code)?;
        vbr.signature = reader.read_u16::<LittleEndian>()?;
        Ok(vbr)
    }

    pub fn to_bytes(&self) -> [u8; BOOT_SECTOR_SIZE] {
        let mut bytes = [0u8; BOOT_SECTOR_SIZE];
        // a fixed-size slice cannot come up short
        let mut cursor = &mut bytes[..];
        let _ = self.write_to(&mut cursor);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; BOOT_SECTOR_SIZE]) -> Self {
        let mut cursor = &bytes[..];
        // 512 bytes is exactly one record, so the read cannot fail
        Self::read_from(&mut cursor).unwrap_or_default()
    }

    pub fn oem_name(&self) -> String {
        String::from_utf8_lossy(&self.oem_name).trim_end().to_string()
    }

    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.volume_label).trim_end().to_string()
    }

    /// Cluster count used to classify the volume as FAT12 or FAT16
    pub fn cluster_count(&self) -> u64 {
        match self.sectors_per_cluster {
            0 => 0,
            spc => self.total_sectors as u64 / spc as u64,
        }
    }
}

impl fmt::Debug for Vbr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vbr")
            .field("oem_name", &self.oem_name())
            .field("bytes_per_sector", &self.bytes_per_sector)
            .field("sectors_per_cluster", &self.sectors_per_cluster)
            .field("reserved_sectors", &self.reserved_sectors)
            .field("num_fats", &self.num_fats)
            .field("root_entries", &self.root_entries)
            .field("sectors_per_fat", &self.sectors_per_fat)
            .field("hidden_sectors", &self.hidden_sectors)
            .field("total_sectors", &self.total_sectors)
            .field("drive_number", &self.drive_number)
            .field("volume_label", &self.volume_label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fat_type_thresholds() {
        assert_eq!(FatType::from_cluster_count(4085).unwrap(), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4086).unwrap(), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65525).unwrap(), FatType::Fat16);
        assert!(matches!(
            FatType::from_cluster_count(65526),
            Err(NandGenError::UnsupportedVolumeSize(65526))
        ));
    }

    #[test]
    fn test_vbr_field_offsets() {
        let mut vbr = Vbr::default();
        vbr.sectors_per_fat = 0x3D;
        vbr.hidden_sectors = 0x877;
        vbr.total_sectors = 0x66F89;
        vbr.drive_number = 1;

        let bytes = vbr.to_bytes();
        assert_eq!(&bytes[0x00..0x03], &[0xE9, 0x00, 0x00]);
        assert_eq!(&bytes[0x03..0x0B], b"TWL     ");
        assert_eq!(u16::from_le_bytes([bytes[0x0B], bytes[0x0C]]), 512);
        assert_eq!(bytes[0x0D], 32);
        assert_eq!(bytes[0x10], 2);
        assert_eq!(bytes[0x15], 0xF8);
        assert_eq!(u16::from_le_bytes([bytes[0x16], bytes[0x17]]), 0x3D);
        assert_eq!(u32::from_le_bytes(bytes[0x1C..0x20].try_into().unwrap()), 0x877);
        assert_eq!(u32::from_le_bytes(bytes[0x20..0x24].try_into().unwrap()), 0x66F89);
        assert_eq!(bytes[0x24], 1);
        assert_eq!(bytes[0x26], 0x29);
        assert_eq!(u32::from_le_bytes(bytes[0x27..0x2B].try_into().unwrap()), 0x12345678);
        assert_eq!(&bytes[0x2B..0x36], b"           ");
        assert_eq!(&bytes[0x1FE..], &[0x55, 0xAA]);

        assert_eq!(Vbr::from_bytes(&bytes), vbr);
    }

    #[test]
    fn test_options_validation() {
        let mut options = VbrOptions::default();
        assert!(options.validate().is_ok());

        options.sectors_per_cluster = 0;
        assert!(matches!(options.validate(), Err(NandGenError::InvalidInput(_))));
    }

    #[test]
    fn test_long_name_attribute_pattern() {
        assert!(FatAttributes(0x0F).is_long_name());
        assert!(!FatAttributes(FatAttributes::DIRECTORY).is_long_name());
        assert!(!FatAttributes(0x2F).is_long_name());
    }
}
