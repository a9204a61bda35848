// DSi AES engine emulation: key scrambler, reflected CTR/CCM, ES containers
// and NAND image crypt

pub mod aes_ccm;
pub mod aes_ctr;
pub mod es;
pub mod key_scrambler;
pub mod nand;

pub use aes_ccm::Ccm;
pub use aes_ctr::{Block, ReflectedCtr};
pub use es::{EsContainer, EsFooter};
pub use key_scrambler::{es_key_x, nand_key_x, scramble, scramble_bytes, KeyPurpose};
pub use nand::{nocash_footer, NandCrypto};
