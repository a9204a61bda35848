use thiserror::Error;

#[derive(Debug, Error)]
pub enum NandGenError {
    #[error("The disk image is unformatted")]
    Unformatted,

    #[error("The disk image is out of free clusters")]
    OutOfClusters,

    #[error("The directory table is full")]
    OutOfEntries,

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Out of available suffixes for short file name: {0}")]
    ShortNameSuffixExhausted(String),

    #[error("Unsupported volume size: {0} clusters (FAT32 is unimplemented)")]
    UnsupportedVolumeSize(u64),

    #[error("Cluster chain starting at {0} is corrupt")]
    CorruptClusterChain(u32),

    #[error("ES footer decryption failed: {0}. Either the data is invalid or the key is wrong")]
    FooterAuthenticationFailed(String),

    #[error("ES data decryption failed, MAC mismatch")]
    MacMismatch,

    #[error("Payload too large: {0} bytes, multiple blocks is unimplemented")]
    PayloadTooLarge(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NandGenError>;
