// FAT Cluster Chain Management
// Following, allocating and linking cluster chains over an in-memory FatTable

use log::trace;
use nandgen_core::{NandGenError, Result};

use super::constants::*;
use super::fat_table::FatTable;

/// Walk the chain starting at `first_cluster`.
///
/// Returns zero-based data-region cluster numbers (FAT index minus 2). The
/// walk stops on the sentinel read from FAT[1]; a chain that leaves the table,
/// points into the reserved entries, or outlives the table's length is
/// reported as corrupt instead of looping forever.
pub fn read_cluster_chain(fat: &FatTable, first_cluster: u32) -> Result<Vec<u32>> {
    let end_of_chain = fat.end_of_chain() as u32;
    let max_steps = fat.len();
    let mut chain = Vec::new();
    let mut current = first_cluster;

    loop {
        if current < FIRST_DATA_CLUSTER || chain.len() >= max_steps {
            return Err(NandGenError::CorruptClusterChain(first_cluster));
        }
        let next = fat
            .get(current)
            .ok_or(NandGenError::CorruptClusterChain(first_cluster))?;

        chain.push(current - FIRST_DATA_CLUSTER);

        if next as u32 == end_of_chain {
            break;
        }
        current = next as u32;
    }

    Ok(chain)
}

/// Find the first free cluster at or after `start_hint`.
///
/// No wrap-around: callers pass increasing hints while allocating a file, and
/// the scan never hands out an index past the data region.
pub fn find_free_cluster(fat: &FatTable, start_hint: u32) -> Result<u32> {
    let start = start_hint.max(FIRST_DATA_CLUSTER);
    let cluster = (start..fat.allocation_limit())
        .find(|&index| fat.is_free(index))
        .ok_or(NandGenError::OutOfClusters)?;
    trace!("Free cluster {} (hint {})", cluster, start_hint);
    Ok(cluster)
}

/// Pick `count` free clusters without marking them, each search starting just
/// after the previous pick
pub fn allocate_clusters(fat: &FatTable, count: usize, start_hint: u32) -> Result<Vec<u32>> {
    let mut clusters = Vec::with_capacity(count);
    let mut hint = start_hint;

    for _ in 0..count {
        let cluster = find_free_cluster(fat, hint)?;
        clusters.push(cluster);
        hint = cluster + 1;
    }

    Ok(clusters)
}

/// Link `clusters` in order and terminate the last one with the sentinel
pub fn link_cluster_chain(fat: &mut FatTable, clusters: &[u32]) -> Result<()> {
    let end_of_chain = fat.end_of_chain();
    for pair in clusters.windows(2) {
        fat.set(pair[0], pair[1] as u16)?;
    }
    if let Some(&last) = clusters.last() {
        fat.set(last, end_of_chain)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::fat::common::structures::FatType;

    fn table() -> FatTable {
        FatTable::formatted(FatType::Fat16, 512, MEDIA_FIXED).unwrap()
    }

    #[test]
    fn test_cluster_chain_reading() {
        let mut fat = table();
        // 2 -> 3 -> 5 -> END
        fat.set(2, 3).unwrap();
        fat.set(3, 5).unwrap();
        fat.set(5, 0xFFFF).unwrap();

        let chain = read_cluster_chain(&fat, 2).unwrap();
        assert_eq!(chain, vec![0, 1, 3]);
    }

    #[test]
    fn test_cyclic_chain_is_rejected() {
        let mut fat = table();
        fat.set(2, 3).unwrap();
        fat.set(3, 2).unwrap();

        assert!(matches!(
            read_cluster_chain(&fat, 2),
            Err(NandGenError::CorruptClusterChain(2))
        ));
    }

    #[test]
    fn test_chain_into_free_entry_is_rejected() {
        let fat = table();
        // FAT[2] is 0, which points into the reserved area
        assert!(read_cluster_chain(&fat, 2).is_err());
    }

    #[test]
    fn test_find_free_respects_hint_and_limit() {
        let mut fat = table();
        fat.set(2, 0xFFFF).unwrap();
        assert_eq!(find_free_cluster(&fat, 0).unwrap(), 3);
        assert_eq!(find_free_cluster(&fat, 10).unwrap(), 10);

        fat.limit_to_data_clusters(3);
        fat.set(3, 0xFFFF).unwrap();
        fat.set(4, 0xFFFF).unwrap();
        assert!(matches!(find_free_cluster(&fat, 2), Err(NandGenError::OutOfClusters)));
    }

    #[test]
    fn test_allocate_and_link() {
        let mut fat = table();
        fat.set(3, 0xFFFF).unwrap();

        let clusters = allocate_clusters(&fat, 3, 2).unwrap();
        assert_eq!(clusters, vec![2, 4, 5]);

        link_cluster_chain(&mut fat, &clusters).unwrap();
        assert_eq!(fat.get(2), Some(4));
        assert_eq!(fat.get(4), Some(5));
        assert_eq!(fat.get(5), Some(0xFFFF));
        assert_eq!(read_cluster_chain(&fat, 2).unwrap(), vec![0, 2, 3]);
    }
}
