// Sector layout calculation for FAT12/FAT16 volumes
// Reproduces the legacy sizing rules of the DSi's own formatter

use nandgen_core::{NandGenError, Result};
use serde::{Deserialize, Serialize};

use super::constants::*;
use super::structures::{FatType, Vbr};

/// Sectors per FAT copy for a volume of `total_clusters` clusters.
///
/// FAT16 gets 1 sector for every 256 clusters and FAT12 gets 3 sectors for
/// every 1024 clusters, both rounded up by adding one before the floor.
pub fn sectors_per_fat(fat_type: FatType, total_clusters: u64) -> u16 {
    match fat_type {
        FatType::Fat16 => (total_clusters / 256 + 1) as u16,
        FatType::Fat12 => ((total_clusters / 1024 + 1) * 3) as u16,
    }
}

/// Sector offsets of every region of a formatted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub fat_start_sector: u32,
    pub sectors_per_fat: u32,
    pub fat_sectors: u32,
    pub num_fats: u32,
    pub root_dir_start_sector: u32,
    pub root_dir_sectors: u32,
    pub data_start_sector: u32,
    pub data_sectors: u32,
}

impl VolumeGeometry {
    pub fn from_vbr(vbr: &Vbr) -> Result<Self> {
        let bytes_per_sector = vbr.bytes_per_sector as u32;
        if bytes_per_sector == 0 || vbr.sectors_per_cluster == 0 {
            return Err(NandGenError::InvalidInput(
                "boot record has a zero sector or cluster size".to_string(),
            ));
        }

        let fat_start_sector = vbr.reserved_sectors as u32;
        let fat_sectors = vbr.sectors_per_fat as u32 * vbr.num_fats as u32;
        let root_dir_start_sector = fat_start_sector + fat_sectors;
        let root_bytes = DIR_ENTRY_SIZE as u32 * vbr.root_entries as u32;
        let root_dir_sectors = (root_bytes + bytes_per_sector - 1) / bytes_per_sector;
        let data_start_sector = root_dir_start_sector + root_dir_sectors;
        let data_sectors = vbr.total_sectors.checked_sub(data_start_sector).ok_or_else(|| {
            NandGenError::InvalidInput(format!(
                "volume of {} sectors cannot hold {} metadata sectors",
                vbr.total_sectors, data_start_sector
            ))
        })?;

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster: vbr.sectors_per_cluster as u32,
            fat_start_sector,
            sectors_per_fat: vbr.sectors_per_fat as u32,
            fat_sectors,
            num_fats: vbr.num_fats as u32,
            root_dir_start_sector,
            root_dir_sectors,
            data_start_sector,
            data_sectors,
        })
    }

    pub fn sectors_to_bytes(&self, sectors: u32) -> u64 {
        sectors as u64 * self.bytes_per_sector as u64
    }

    pub fn cluster_size(&self) -> u64 {
        self.sectors_to_bytes(self.sectors_per_cluster)
    }

    /// Clusters that actually fit in the data region
    pub fn data_clusters(&self) -> u32 {
        self.data_sectors / self.sectors_per_cluster
    }

    /// Size of one FAT copy in bytes
    pub fn fat_bytes(&self) -> u64 {
        self.sectors_to_bytes(self.sectors_per_fat)
    }

    pub fn fat_offset(&self, copy: u32) -> u64 {
        self.sectors_to_bytes(self.fat_start_sector) + copy as u64 * self.fat_bytes()
    }

    /// Byte range of the fixed root directory region
    pub fn root_dir_range(&self) -> (u64, u64) {
        let start = self.sectors_to_bytes(self.root_dir_start_sector);
        (start, start + self.sectors_to_bytes(self.root_dir_sectors))
    }

    /// Byte offset of a zero-based data cluster (FAT index minus 2)
    pub fn data_cluster_offset(&self, data_cluster: u32) -> u64 {
        self.sectors_to_bytes(self.data_start_sector) + data_cluster as u64 * self.cluster_size()
    }

    /// Byte offset of the cluster a FAT index refers to
    pub fn cluster_offset(&self, fat_index: u32) -> u64 {
        self.data_cluster_offset(fat_index - FIRST_DATA_CLUSTER)
    }

    /// Largest number of clusters a subdirectory chain may span
    pub fn max_directory_clusters(&self) -> u64 {
        MAX_DIRECTORY_BYTES as u64 / self.cluster_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sectors_per_fat_rules() {
        assert_eq!(sectors_per_fat(FatType::Fat16, 15360), 61);
        assert_eq!(sectors_per_fat(FatType::Fat16, 255), 1);
        assert_eq!(sectors_per_fat(FatType::Fat16, 256), 2);
        assert_eq!(sectors_per_fat(FatType::Fat12, 2096), 9);
        assert_eq!(sectors_per_fat(FatType::Fat12, 1023), 3);
    }

    #[test]
    fn test_geometry_from_vbr() {
        let mut vbr = Vbr::default();
        vbr.sectors_per_fat = 61;
        vbr.total_sectors = 491520;

        let geometry = VolumeGeometry::from_vbr(&vbr).unwrap();
        assert_eq!(geometry.fat_start_sector, 1);
        assert_eq!(geometry.fat_sectors, 122);
        assert_eq!(geometry.root_dir_start_sector, 123);
        assert_eq!(geometry.root_dir_sectors, 32);
        assert_eq!(geometry.data_start_sector, 155);
        assert_eq!(geometry.data_sectors, 491520 - 155);
        assert_eq!(geometry.cluster_size(), 16384);
        assert_eq!(geometry.cluster_offset(2), 155 * 512);
        assert_eq!(geometry.max_directory_clusters(), 128);
    }

    #[test]
    fn test_geometry_rejects_tiny_volume() {
        let mut vbr = Vbr::default();
        vbr.sectors_per_fat = 3;
        vbr.total_sectors = 10;
        assert!(VolumeGeometry::from_vbr(&vbr).is_err());
    }
}
