// FAT12/FAT16 directory entries and directory region scanning

use byteorder::{ByteOrder, LittleEndian};
use nandgen_core::Result;
use serde::Serialize;

use super::constants::*;
use super::long_names::{build_lfn_fragments, combine_lfn_fragments, lfn_checksum, LfnFragment};
use super::short_names::{display_short_name, generate_short_name, pack_short_name};
use super::structures::FatAttributes;

/// 32-byte short (8.3) directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEntry {
    /// Name as the directory stores it logically (0x05 escape already undone)
    pub name: [u8; SHORT_NAME_LEN],
    pub attributes: FatAttributes,
    pub reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster: u32,
    pub write_time: u16,
    pub write_date: u16,
    pub size: u32,
}

impl ShortEntry {
    pub fn new(name: [u8; SHORT_NAME_LEN], attributes: u8, first_cluster: u32, size: u32) -> Self {
        Self {
            name,
            attributes: FatAttributes(attributes),
            reserved: 0,
            creation_time_tenth: 0,
            creation_time: 0,
            creation_date: DEFAULT_DATE,
            access_date: 0,
            first_cluster,
            write_time: 0,
            write_date: DEFAULT_DATE,
            size,
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut slot = [0u8; DIR_ENTRY_SIZE];
        slot[0..11].copy_from_slice(&self.name);
        // a real leading 0xE5 would read back as a deleted slot
        if slot[0] == ENTRY_DELETED {
            slot[0] = ENTRY_E5_ESCAPE;
        }
        slot[11] = self.attributes.0;
        slot[12] = self.reserved;
        slot[13] = self.creation_time_tenth;
        LittleEndian::write_u16(&mut slot[14..16], self.creation_time);
        LittleEndian::write_u16(&mut slot[16..18], self.creation_date);
        LittleEndian::write_u16(&mut slot[18..20], self.access_date);
        LittleEndian::write_u16(&mut slot[20..22], (self.first_cluster >> 16) as u16);
        LittleEndian::write_u16(&mut slot[22..24], self.write_time);
        LittleEndian::write_u16(&mut slot[24..26], self.write_date);
        LittleEndian::write_u16(&mut slot[26..28], self.first_cluster as u16);
        LittleEndian::write_u32(&mut slot[28..32], self.size);
        slot
    }

    pub fn from_bytes(slot: &[u8]) -> Self {
        let mut name = [0u8; SHORT_NAME_LEN];
        name.copy_from_slice(&slot[0..11]);
        if name[0] == ENTRY_E5_ESCAPE {
            name[0] = ENTRY_DELETED;
        }

        let cluster_high = LittleEndian::read_u16(&slot[20..22]) as u32;
        let cluster_low = LittleEndian::read_u16(&slot[26..28]) as u32;

        Self {
            name,
            attributes: FatAttributes(slot[11]),
            reserved: slot[12],
            creation_time_tenth: slot[13],
            creation_time: LittleEndian::read_u16(&slot[14..16]),
            creation_date: LittleEndian::read_u16(&slot[16..18]),
            access_date: LittleEndian::read_u16(&slot[18..20]),
            first_cluster: (cluster_high << 16) | cluster_low,
            write_time: LittleEndian::read_u16(&slot[22..24]),
            write_date: LittleEndian::read_u16(&slot[24..26]),
            size: LittleEndian::read_u32(&slot[28..32]),
        }
    }
}

/// What a single 32-byte slot holds, decided by its first byte and attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSlot {
    /// 0x00: nothing follows in this region
    End,
    /// 0xE5: free for reuse
    Deleted,
    LongName(LfnFragment),
    Short(ShortEntry),
}

impl DirSlot {
    pub fn decode(slot: &[u8]) -> Self {
        match slot[0] {
            ENTRY_END => DirSlot::End,
            ENTRY_DELETED => DirSlot::Deleted,
            _ if FatAttributes(slot[11]).is_long_name() => {
                DirSlot::LongName(LfnFragment::from_bytes(slot))
            }
            _ => DirSlot::Short(ShortEntry::from_bytes(slot)),
        }
    }

    pub fn is_free(slot: &[u8]) -> bool {
        slot[0] == ENTRY_END || slot[0] == ENTRY_DELETED
    }
}

/// A directory listing entry: the short entry plus the name it is known by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub short: ShortEntry,
    /// Fragments in on-disk order; empty for "." and ".."
    pub long_name: Vec<LfnFragment>,
}

impl DirEntry {
    /// Build a new named entry, choosing a short name that is unique among
    /// `siblings`. A long name is always attached, even for valid 8.3 names.
    pub fn create(
        name: &str,
        attributes: u8,
        first_cluster: u32,
        size: u32,
        siblings: &[DirEntry],
    ) -> Result<Self> {
        let taken: Vec<[u8; SHORT_NAME_LEN]> =
            siblings.iter().map(|entry| entry.short.name).collect();
        let short_name = generate_short_name(name, &taken)?;
        let long_name = build_lfn_fragments(name, lfn_checksum(&short_name));

        Ok(Self {
            name: name.to_string(),
            short: ShortEntry::new(short_name, attributes, first_cluster, size),
            long_name,
        })
    }

    /// "." or ".." entry for a new subdirectory
    pub fn dot(name: &str, first_cluster: u32) -> Self {
        Self {
            name: name.to_string(),
            short: ShortEntry::new(
                pack_short_name(name.as_bytes(), b""),
                FatAttributes::DIRECTORY,
                first_cluster,
                0,
            ),
            long_name: Vec::new(),
        }
    }

    /// Number of consecutive 32-byte slots this entry occupies
    pub fn slot_count(&self) -> usize {
        self.long_name.len() + 1
    }

    /// Long-name fragments followed by the short entry
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.slot_count() * DIR_ENTRY_SIZE);
        for fragment in &self.long_name {
            bytes.extend_from_slice(&fragment.to_bytes());
        }
        bytes.extend_from_slice(&self.short.to_bytes());
        bytes
    }

    pub fn short_name(&self) -> String {
        display_short_name(&self.short.name)
    }

    pub fn first_cluster(&self) -> u32 {
        self.short.first_cluster
    }

    pub fn size(&self) -> u32 {
        self.short.size
    }

    pub fn is_directory(&self) -> bool {
        self.short.attributes.is_directory()
    }

    /// Files carry the archive bit and not the subdirectory bit
    pub fn is_file(&self) -> bool {
        !self.short.attributes.is_directory() && self.short.attributes.is_archive()
    }

    pub fn is_read_only(&self) -> bool {
        self.short.attributes.is_read_only()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.to_uppercase() == name.to_uppercase()
    }

    /// Flattened view for listings
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: self.name.clone(),
            short_name: self.short_name(),
            is_directory: self.is_directory(),
            read_only: self.is_read_only(),
            first_cluster: self.first_cluster(),
            size: self.size(),
        }
    }
}

/// Serializable summary of a directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub short_name: String,
    pub is_directory: bool,
    pub read_only: bool,
    pub first_cluster: u32,
    pub size: u32,
}

/// Decode every live entry in one directory region (the root area or one
/// cluster of a subdirectory), stopping at the first end marker.
pub fn parse_region(region: &[u8]) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut pending: Vec<LfnFragment> = Vec::new();

    for slot in region.chunks_exact(DIR_ENTRY_SIZE) {
        match DirSlot::decode(slot) {
            DirSlot::End => break,
            DirSlot::Deleted => pending.clear(),
            DirSlot::LongName(fragment) => pending.push(fragment),
            DirSlot::Short(short) => {
                let long_name = std::mem::take(&mut pending);
                let name = if long_name.is_empty() {
                    display_short_name(&short.name)
                } else {
                    combine_lfn_fragments(&long_name)
                };
                entries.push(DirEntry { name, short, long_name });
            }
        }
    }

    entries
}

/// Byte offset of the first run of `slots` free slots in `region`, if any
pub fn find_free_run(region: &[u8], slots: usize) -> Option<usize> {
    let needed = slots * DIR_ENTRY_SIZE;
    let mut offset = 0;

    while offset + needed <= region.len() {
        let run_is_free = region[offset..offset + needed]
            .chunks_exact(DIR_ENTRY_SIZE)
            .all(DirSlot::is_free);
        if run_is_free {
            return Some(offset);
        }
        offset += DIR_ENTRY_SIZE;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_entry_layout() {
        let entry = ShortEntry::new(*b"TITLE   TMD", FatAttributes::ARCHIVE, 0x0012_0034, 520);
        let slot = entry.to_bytes();

        assert_eq!(&slot[0..11], b"TITLE   TMD");
        assert_eq!(slot[11], 0x20);
        assert_eq!(&slot[16..18], &[0x21, 0x28]);
        assert_eq!(&slot[20..22], &[0x12, 0x00]);
        assert_eq!(&slot[24..26], &[0x21, 0x28]);
        assert_eq!(&slot[26..28], &[0x34, 0x00]);
        assert_eq!(&slot[28..32], &520u32.to_le_bytes());
        assert_eq!(ShortEntry::from_bytes(&slot), entry);
    }

    #[test]
    fn test_e5_escape() {
        let mut name = *b"XBCDEFGHTXT";
        name[0] = 0xE5;
        let slot = ShortEntry::new(name, FatAttributes::ARCHIVE, 2, 1).to_bytes();
        assert_eq!(slot[0], 0x05);
        assert_eq!(ShortEntry::from_bytes(&slot).name[0], 0xE5);
    }

    #[test]
    fn test_parse_region_with_long_names() {
        let first =
            DirEntry::create("hello world.txt", FatAttributes::ARCHIVE, 2, 11, &[]).unwrap();
        let second =
            DirEntry::create("sys", FatAttributes::DIRECTORY, 3, 0, &[first.clone()]).unwrap();

        let mut region = vec![0u8; 512];
        let first_bytes = first.to_bytes();
        region[..first_bytes.len()].copy_from_slice(&first_bytes);
        // deleted slot between the two entries
        region[first_bytes.len()] = ENTRY_DELETED;
        let second_offset = first_bytes.len() + DIR_ENTRY_SIZE;
        region[second_offset..second_offset + 64].copy_from_slice(&second.to_bytes());

        let entries = parse_region(&region);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], first);
        assert_eq!(entries[0].short_name(), "HELLOW~1.TXT");
        assert!(entries[0].is_file());
        assert_eq!(entries[1].name, "sys");
        assert!(entries[1].is_directory());
    }

    #[test]
    fn test_dot_entries_have_no_long_name() {
        let dot = DirEntry::dot(".", 5);
        let dotdot = DirEntry::dot("..", 0);
        assert_eq!(dot.slot_count(), 1);
        assert_eq!(&dot.to_bytes()[0..11], b".          ");

        let mut region = vec![0u8; 128];
        region[0..32].copy_from_slice(&dot.to_bytes());
        region[32..64].copy_from_slice(&dotdot.to_bytes());
        let entries = parse_region(&region);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[1].name, "..");
        assert_eq!(entries[1].first_cluster(), 0);
    }

    #[test]
    fn test_find_free_run() {
        let mut region = vec![0u8; 32 * 6];
        region[0] = b'A';
        region[64] = b'B';
        region[96] = ENTRY_DELETED;

        assert_eq!(find_free_run(&region, 1), Some(32));
        assert_eq!(find_free_run(&region, 2), Some(96));
        assert_eq!(find_free_run(&region, 3), Some(96));
        assert_eq!(find_free_run(&region, 4), None);
    }

    #[test]
    fn test_case_insensitive_match() {
        let entry = DirEntry::create("Title.TMD", FatAttributes::ARCHIVE, 2, 1, &[]).unwrap();
        assert!(entry.matches("title.tmd"));
        assert!(!entry.matches("title.tm"));
    }
}
