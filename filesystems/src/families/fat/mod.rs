// FAT filesystem family
// FAT12 and FAT16 volumes as written by the DSi's formatter

pub mod common;
pub mod volume;


pub use common::{DirEntry, EntryInfo, FatAttributes, FatPath, FatType, Vbr, VbrOptions, VolumeGeometry};
pub use volume::FatVolume;
