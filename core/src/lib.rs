pub mod error;
pub mod storage;

pub use error::{NandGenError, Result};
pub use storage::Storage;
