// On-disk building blocks shared by every FAT12/FAT16 operation

pub mod constants;
pub mod structures;
pub mod cluster_calc;
pub mod fat_table;
pub mod cluster_chain;
pub mod long_names;
pub mod short_names;
pub mod directory;
pub mod path;

pub use constants::*;
pub use structures::*;
pub use cluster_calc::*;
pub use fat_table::*;
pub use cluster_chain::*;
pub use directory::*;
pub use path::FatPath;
