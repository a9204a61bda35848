// FAT12/FAT16 volume: format, directory lookup, file and directory creation
// Works on any seekable storage; the whole FAT is kept in memory and flushed
// to every on-disk copy at the end of each mutating call

use log::{debug, info, trace};
use nandgen_core::{NandGenError, Result, Storage};

use super::common::*;

/// Where a directory's slots live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirLocation {
    /// Fixed region between the FATs and the data area
    Root,
    /// Cluster chain starting at this FAT index
    Chain(u32),
}

impl DirLocation {
    /// Value written into a child's ".." entry
    fn first_cluster(&self) -> u32 {
        match self {
            DirLocation::Root => 0,
            DirLocation::Chain(cluster) => *cluster,
        }
    }
}

/// Everything known about a formatted volume
#[derive(Debug)]
struct VolumeState {
    vbr: Vbr,
    fat_type: FatType,
    geometry: VolumeGeometry,
    fat: FatTable,
}

impl VolumeState {
    fn from_vbr(vbr: Vbr) -> Result<Self> {
        let fat_type = FatType::from_cluster_count(vbr.cluster_count())?;
        let geometry = VolumeGeometry::from_vbr(&vbr)?;
        let fat =
            FatTable::formatted(fat_type, geometry.fat_bytes() as usize, vbr.media_descriptor)?;
        Ok(Self { vbr, fat_type, geometry, fat })
    }

    fn cluster_size(&self) -> usize {
        self.geometry.cluster_size() as usize
    }

    fn read_fat<S: Storage + ?Sized>(&mut self, storage: &mut S) -> Result<()> {
        let mut bytes = vec![0u8; self.geometry.fat_bytes() as usize];
        storage.read_at(self.geometry.fat_offset(0), &mut bytes)?;
        self.fat = FatTable::decode(self.fat_type, &bytes)?;
        self.fat.limit_to_data_clusters(self.geometry.data_clusters());
        Ok(())
    }

    /// Flush the in-memory FAT to every copy
    fn write_fat<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<()> {
        let bytes = self.fat.encode();
        for copy in 0..self.geometry.num_fats {
            storage.write_at(self.geometry.fat_offset(copy), &bytes)?;
        }
        trace!("Wrote {} FAT copies ({} bytes each)", self.geometry.num_fats, bytes.len());
        Ok(())
    }

    fn read_data_cluster<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        data_cluster: u32,
    ) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.cluster_size()];
        storage.read_at(self.geometry.data_cluster_offset(data_cluster), &mut buffer)?;
        Ok(buffer)
    }

    fn read_root<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<Vec<u8>> {
        let (start, end) = self.geometry.root_dir_range();
        let mut buffer = vec![0u8; (end - start) as usize];
        storage.read_at(start, &mut buffer)?;
        Ok(buffer)
    }

    fn list<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        location: DirLocation,
    ) -> Result<Vec<DirEntry>> {
        match location {
            DirLocation::Root => Ok(parse_region(&self.read_root(storage)?)),
            DirLocation::Chain(first_cluster) => {
                let mut entries = Vec::new();
                for data_cluster in read_cluster_chain(&self.fat, first_cluster)? {
                    let region = self.read_data_cluster(storage, data_cluster)?;
                    entries.extend(parse_region(&region));
                }
                Ok(entries)
            }
        }
    }

    /// Follow `path` from the root, requiring every segment to be a directory
    fn resolve_dir<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        path: &FatPath,
    ) -> Result<DirLocation> {
        let mut location = DirLocation::Root;
        let mut walked = FatPath::root();

        for segment in path.segments() {
            walked = walked.join(segment);
            let entry = self
                .list(storage, location)?
                .into_iter()
                .find(|entry| entry.matches(segment))
                .ok_or_else(|| NandGenError::EntryNotFound(walked.to_string()))?;

            if !entry.is_directory() {
                return Err(NandGenError::NotADirectory(walked.to_string()));
            }
            // ".." of a first-level directory points back at the root as cluster 0
            location = match entry.first_cluster() {
                0 => DirLocation::Root,
                cluster => DirLocation::Chain(cluster),
            };
        }

        Ok(location)
    }

    fn find_entry<S: Storage + ?Sized>(&self, storage: &mut S, path: &FatPath) -> Result<DirEntry> {
        let (parent, name) = split_path(path)?;
        let location = self.resolve_dir(storage, &parent)?;
        self.list(storage, location)?
            .into_iter()
            .find(|entry| entry.matches(name))
            .ok_or_else(|| NandGenError::EntryNotFound(path.to_string()))
    }

    /// Place `entry` in the first run of free slots large enough to hold it.
    ///
    /// A full subdirectory grows by one zeroed cluster, searched for from
    /// `extension_hint`; the FAT change is left for the caller to flush.
    fn insert_entry<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
        location: DirLocation,
        entry: &DirEntry,
        extension_hint: u32,
    ) -> Result<()> {
        let bytes = entry.to_bytes();
        let slots = entry.slot_count();

        let first_cluster = match location {
            DirLocation::Root => {
                let region = self.read_root(storage)?;
                let offset = find_free_run(&region, slots).ok_or(NandGenError::OutOfEntries)?;
                let (start, _) = self.geometry.root_dir_range();
                trace!("Root entry '{}' at slot {}", entry.name, offset / DIR_ENTRY_SIZE);
                storage.write_at(start + offset as u64, &bytes)?;
                return Ok(());
            }
            DirLocation::Chain(first_cluster) => first_cluster,
        };

        let chain = read_cluster_chain(&self.fat, first_cluster)?;
        for &data_cluster in &chain {
            let region = self.read_data_cluster(storage, data_cluster)?;
            if let Some(offset) = find_free_run(&region, slots) {
                trace!(
                    "Entry '{}' at cluster {} slot {}",
                    entry.name,
                    data_cluster + FIRST_DATA_CLUSTER,
                    offset / DIR_ENTRY_SIZE
                );
                let cluster_start = self.geometry.data_cluster_offset(data_cluster);
                storage.write_at(cluster_start + offset as u64, &bytes)?;
                return Ok(());
            }
        }

        if chain.len() as u64 >= self.geometry.max_directory_clusters()
            || bytes.len() > self.cluster_size()
        {
            return Err(NandGenError::OutOfEntries);
        }

        let new_cluster = find_free_cluster(&self.fat, extension_hint)?;
        debug!("Extending directory at cluster {} with cluster {}", first_cluster, new_cluster);

        let cluster_start = self.geometry.cluster_offset(new_cluster);
        storage.zero_range(cluster_start, self.geometry.cluster_size())?;
        storage.write_at(cluster_start, &bytes)?;

        let last = chain.last().copied().unwrap_or(0) + FIRST_DATA_CLUSTER;
        self.fat.set(new_cluster, self.fat.end_of_chain())?;
        self.fat.set(last, new_cluster as u16)?;
        Ok(())
    }
}

/// Split a non-root path into its parent and final name
fn split_path(path: &FatPath) -> Result<(FatPath, &str)> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(NandGenError::EntryNotFound(path.to_string())),
    }
}

/// A FAT12/FAT16 volume on top of seekable storage.
///
/// A volume without the 0xAA55 boot signature is unformatted: every call
/// except `format` fails with `NandGenError::Unformatted` until it is
/// formatted.
pub struct FatVolume<S: Storage> {
    storage: S,
    state: Option<VolumeState>,
}

impl<S: Storage> FatVolume<S> {
    /// Open `storage`, mounting it when it carries a boot signature
    pub fn open(mut storage: S) -> Result<Self> {
        let mut state = None;

        if storage.storage_len()? >= BOOT_SECTOR_SIZE as u64 {
            let mut signature = [0u8; 2];
            storage.read_at(BOOT_SIGNATURE_OFFSET, &mut signature)?;

            if u16::from_le_bytes(signature) == BOOT_SIGNATURE {
                let mut sector = [0u8; BOOT_SECTOR_SIZE];
                storage.read_at(0, &mut sector)?;

                let mut mounted = VolumeState::from_vbr(Vbr::from_bytes(&sector))?;
                mounted.read_fat(&mut storage)?;
                info!(
                    "Opened {} volume: {} sectors, {} data clusters, end of chain {:#06X}",
                    mounted.fat_type,
                    mounted.vbr.total_sectors,
                    mounted.geometry.data_clusters(),
                    mounted.fat.end_of_chain()
                );
                state = Some(mounted);
            }
        }

        if state.is_none() {
            debug!("No boot signature found, volume is unformatted");
        }

        Ok(Self { storage, state })
    }

    pub fn is_formatted(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&VolumeState> {
        self.state.as_ref().ok_or(NandGenError::Unformatted)
    }

    fn parts(&mut self) -> Result<(&mut S, &mut VolumeState)> {
        let state = self.state.as_mut().ok_or(NandGenError::Unformatted)?;
        Ok((&mut self.storage, state))
    }

    /// Format the whole storage as one FAT12/FAT16 volume.
    ///
    /// `partition_offset` is the byte offset of the volume inside the disk
    /// image (recorded as hidden sectors) and `drive_number` goes into the
    /// extended boot record. Returns the resulting layout.
    pub fn format(
        &mut self,
        partition_offset: u32,
        drive_number: u8,
        options: Option<&VbrOptions>,
    ) -> Result<VolumeGeometry> {
        let default_options = VbrOptions::default();
        let options = options.unwrap_or(&default_options);
        options.validate()?;

        let length = self.storage.storage_len()?;
        let bytes_per_sector = options.bytes_per_sector as u64;
        let total_clusters = length / bytes_per_sector / options.sectors_per_cluster as u64;
        let fat_type = FatType::from_cluster_count(total_clusters)?;

        let mut vbr = Vbr::from_options(options);
        vbr.sectors_per_fat = sectors_per_fat(fat_type, total_clusters);
        vbr.hidden_sectors = partition_offset / options.bytes_per_sector as u32;
        vbr.total_sectors = u32::try_from(length / bytes_per_sector)
            .map_err(|_| NandGenError::UnsupportedVolumeSize(total_clusters))?;
        vbr.drive_number = drive_number;

        let mut state = VolumeState::from_vbr(vbr)?;
        state.fat.limit_to_data_clusters(state.geometry.data_clusters());

        info!(
            "Formatting {} volume: {} bytes, {} clusters, {} sectors per FAT",
            fat_type, length, total_clusters, state.vbr.sectors_per_fat
        );
        debug!("Volume layout: {:?}", state.geometry);

        self.storage.write_at(0, &state.vbr.to_bytes())?;
        let (root_start, root_end) = state.geometry.root_dir_range();
        self.storage.zero_range(root_start, root_end - root_start)?;
        state.write_fat(&mut self.storage)?;

        let geometry = state.geometry;
        self.state = Some(state);
        Ok(geometry)
    }

    /// List a directory, including "." and ".." for subdirectories
    pub fn entries(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let path = FatPath::parse(path);
        let (storage, state) = self.parts()?;
        let location = state.resolve_dir(storage, &path)?;
        state.list(storage, location)
    }

    /// Look up a single entry. The root has no entry of its own.
    pub fn entry(&mut self, path: &str) -> Result<DirEntry> {
        let path = FatPath::parse(path);
        debug!("Looking up {}", path);
        let (storage, state) = self.parts()?;
        state.find_entry(storage, &path)
    }

    pub fn entry_exists(&mut self, path: &str) -> Result<bool> {
        let path = FatPath::parse(path);
        if path.is_root() {
            self.state()?;
            return Ok(true);
        }
        match self.entry(&path.to_string()) {
            Ok(_) => Ok(true),
            Err(NandGenError::EntryNotFound(_)) | Err(NandGenError::NotADirectory(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_directory(&mut self, path: &str) -> Result<bool> {
        if FatPath::parse(path).is_root() {
            self.state()?;
            return Ok(true);
        }
        Ok(self.entry(path)?.is_directory())
    }

    pub fn is_file(&mut self, path: &str) -> Result<bool> {
        if FatPath::parse(path).is_root() {
            self.state()?;
            return Ok(false);
        }
        Ok(self.entry(path)?.is_file())
    }

    /// Read a file's contents, exactly as many bytes as its entry records
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let path = FatPath::parse(path);
        let (storage, state) = self.parts()?;
        let entry = state.find_entry(storage, &path)?;

        if entry.is_directory() {
            return Err(NandGenError::InvalidInput(format!("{} is a directory", path)));
        }

        let size = entry.size() as usize;
        let mut data = Vec::with_capacity(size);
        if size == 0 {
            return Ok(data);
        }

        for data_cluster in read_cluster_chain(&state.fat, entry.first_cluster())? {
            let remaining = size - data.len();
            if remaining == 0 {
                break;
            }
            let cluster = state.read_data_cluster(storage, data_cluster)?;
            data.extend_from_slice(&cluster[..remaining.min(cluster.len())]);
        }

        if data.len() != size {
            return Err(NandGenError::CorruptClusterChain(entry.first_cluster()));
        }

        debug!("Read {} bytes from {}", size, path);
        Ok(data)
    }

    /// Create a file holding `data`.
    ///
    /// Clusters are chosen first, data is written, the entry is inserted into
    /// the parent, and only then is the chain recorded in the FAT.
    pub fn create_file(&mut self, path: &str, data: &[u8], read_only: bool) -> Result<()> {
        let path = FatPath::parse(path);
        let (storage, state) = self.parts()?;
        let (parent, name) = split_path(&path)?;

        let size = u32::try_from(data.len()).map_err(|_| {
            NandGenError::InvalidInput(format!("{} bytes is too large for FAT", data.len()))
        })?;

        let location = state.resolve_dir(storage, &parent)?;
        let siblings = state.list(storage, location)?;
        if siblings.iter().any(|entry| entry.matches(name)) {
            return Err(NandGenError::EntryAlreadyExists(path.to_string()));
        }

        let cluster_size = state.cluster_size();
        let cluster_count = (data.len() + cluster_size - 1) / cluster_size;
        let clusters = allocate_clusters(&state.fat, cluster_count, FIRST_DATA_CLUSTER)?;
        debug!("Creating {} ({} bytes, {} clusters)", path, data.len(), cluster_count);

        for (&cluster, chunk) in clusters.iter().zip(data.chunks(cluster_size)) {
            let offset = state.geometry.cluster_offset(cluster);
            if chunk.len() < cluster_size {
                storage.zero_range(offset, cluster_size as u64)?;
            }
            storage.write_at(offset, chunk)?;
        }

        let mut attributes = FatAttributes::ARCHIVE;
        if read_only {
            attributes |= FatAttributes::READ_ONLY;
        }
        let first_cluster = clusters.first().copied().unwrap_or(0);
        let entry = DirEntry::create(name, attributes, first_cluster, size, &siblings)?;

        // a directory extension must not land on the file's own clusters
        let extension_hint = clusters.last().copied().unwrap_or(1) + 2;
        state.insert_entry(storage, location, &entry, extension_hint)?;

        link_cluster_chain(&mut state.fat, &clusters)?;
        state.write_fat(storage)
    }

    /// Create a directory. Succeeds without change if it already exists.
    pub fn create_directory(&mut self, path: &str) -> Result<()> {
        let path = FatPath::parse(path);
        let (storage, state) = self.parts()?;
        let (parent, name) = split_path(&path)?;

        let location = state.resolve_dir(storage, &parent)?;
        let siblings = state.list(storage, location)?;
        if let Some(existing) = siblings.iter().find(|entry| entry.matches(name)) {
            if existing.is_directory() {
                return Ok(());
            }
            return Err(NandGenError::EntryAlreadyExists(path.to_string()));
        }

        let cluster = find_free_cluster(&state.fat, FIRST_DATA_CLUSTER)?;
        debug!("Creating directory {} at cluster {}", path, cluster);

        let cluster_start = state.geometry.cluster_offset(cluster);
        storage.zero_range(cluster_start, state.geometry.cluster_size())?;

        let entry = DirEntry::create(name, FatAttributes::DIRECTORY, cluster, 0, &siblings)?;

        let dot = DirEntry::dot(".", cluster);
        let dot_dot = DirEntry::dot("..", location.first_cluster());
        storage.write_at(cluster_start, &dot.to_bytes())?;
        storage.write_at(cluster_start + DIR_ENTRY_SIZE as u64, &dot_dot.to_bytes())?;

        state.insert_entry(storage, location, &entry, cluster + 1)?;

        // the cluster only becomes visible once everything else succeeded
        state.fat.set(cluster, state.fat.end_of_chain())?;
        state.write_fat(storage)
    }

    /// Zero-based data clusters of the chain starting at FAT index `first_cluster`
    pub fn cluster_chain(&self, first_cluster: u32) -> Result<Vec<u32>> {
        read_cluster_chain(&self.state()?.fat, first_cluster)
    }

    /// First free FAT index at or after `start_hint`
    pub fn free_cluster_index(&self, start_hint: u32) -> Result<u32> {
        find_free_cluster(&self.state()?.fat, start_hint)
    }

    pub fn free_clusters(&self) -> Result<usize> {
        Ok(self.state()?.fat.free_clusters())
    }

    pub fn geometry(&self) -> Result<&VolumeGeometry> {
        Ok(&self.state()?.geometry)
    }

    pub fn vbr(&self) -> Result<&Vbr> {
        Ok(&self.state()?.vbr)
    }

    pub fn fat_type(&self) -> Result<FatType> {
        Ok(self.state()?.fat_type)
    }

    pub fn end_of_chain(&self) -> Result<u16> {
        Ok(self.state()?.fat.end_of_chain())
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}
