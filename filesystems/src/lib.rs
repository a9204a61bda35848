// Filesystem implementations used to build NAND partition images

pub mod families;

pub use families::fat::{
    DirEntry, EntryInfo, FatAttributes, FatPath, FatType, FatVolume, Vbr, VbrOptions, VolumeGeometry,
};
