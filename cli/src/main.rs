use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, info};
use nandgen_crypto::{nocash_footer, EsContainer, NandCrypto};
use nandgen_filesystems::{FatVolume, VbrOptions};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nandgen")]
#[command(about = "Build and inspect DSi NAND partition images", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and format a FAT partition image, optionally filling it from a host directory
    Mkpart {
        /// Partition size in bytes (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_number)]
        size: u64,
        /// Byte offset of the partition inside the whole NAND image
        #[arg(long, value_parser = parse_number, default_value = "0")]
        offset: u64,
        /// BIOS drive number written to the boot record
        #[arg(long, default_value_t = 0)]
        drive: u8,
        /// Host directory mirrored into the new volume
        #[arg(long)]
        source: Option<PathBuf>,
        /// Image file to create (overwritten if present)
        #[arg(short, long)]
        output: PathBuf,
        /// JSON file with boot record overrides
        #[arg(long)]
        vbr_config: Option<PathBuf>,
    },
    /// List a directory inside a partition image
    Ls {
        image: PathBuf,
        #[arg(default_value = "\\")]
        path: String,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy a file out of a partition image
    Extract {
        image: PathBuf,
        path: String,
        output: PathBuf,
    },
    /// Wrap a file in an ES container for a console
    EsEncrypt {
        /// 64-bit console id in hex
        #[arg(long)]
        console_id: String,
        /// 12-byte nonce in hex (random if omitted)
        #[arg(long)]
        nonce: Option<String>,
        input: PathBuf,
        output: PathBuf,
    },
    /// Unwrap and authenticate an ES container
    EsDecrypt {
        #[arg(long)]
        console_id: String,
        input: PathBuf,
        output: PathBuf,
    },
    /// Encrypt or decrypt raw NAND data (the operation is its own inverse)
    NandCrypt {
        /// eMMC CID, 16 bytes in hex
        #[arg(long)]
        cid: String,
        #[arg(long)]
        console_id: String,
        /// Image offset the input starts at
        #[arg(long, value_parser = parse_number, default_value = "0")]
        offset: u64,
        /// Append the no$gba CID/console id trailer to the output
        #[arg(long)]
        nocash_footer: bool,
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Mkpart { size, offset, drive, source, output, vbr_config } => {
            let options = match vbr_config {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let options: VbrOptions = serde_json::from_str(&text)
                        .with_context(|| format!("parsing {}", path.display()))?;
                    Some(options)
                }
                None => None,
            };
            let offset = u32::try_from(offset).context("partition offset does not fit in 32 bits")?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            file.set_len(size)?;

            let mut volume = FatVolume::open(file)?;
            let geometry = volume.format(offset, drive, options.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&geometry)?);

            if let Some(source) = source {
                let (directories, files) = collect_tree(&source)?;
                for directory in &directories {
                    volume
                        .create_directory(directory)
                        .with_context(|| format!("creating directory {}", directory))?;
                }
                for (host, target, read_only) in &files {
                    let data = fs::read(host).with_context(|| format!("reading {}", host.display()))?;
                    volume
                        .create_file(target, &data, *read_only)
                        .with_context(|| format!("writing {}", target))?;
                }
                info!(
                    "Copied {} directories and {} files, {} clusters free",
                    directories.len(),
                    files.len(),
                    volume.free_clusters()?
                );
            }
        }
        Commands::Ls { image, path, json } => {
            let mut volume = open_image(&image)?;
            let entries = volume.entries(&path)?;
            if json {
                let infos: Vec<_> = entries.iter().map(|entry| entry.info()).collect();
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for entry in entries {
                    let kind = if entry.is_directory() { "<DIR>" } else { "" };
                    let flag = if entry.is_read_only() { "R" } else { " " };
                    println!(
                        "{:<5} {} {:>10}  {:<12} {}",
                        kind,
                        flag,
                        entry.size(),
                        entry.short_name(),
                        entry.name
                    );
                }
            }
        }
        Commands::Extract { image, path, output } => {
            let mut volume = open_image(&image)?;
            let data = volume.read_file(&path)?;
            fs::write(&output, &data).with_context(|| format!("writing {}", output.display()))?;
            println!("Extracted {} bytes to {}", data.len(), output.display());
        }
        Commands::EsEncrypt { console_id, nonce, input, output } => {
            let container = EsContainer::for_console(parse_console_id(&console_id)?);
            let data = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let blob = match nonce {
                Some(nonce) => container.encrypt_with_nonce(&data, &parse_hex_array(&nonce, "nonce")?)?,
                None => container.encrypt(&data)?,
            };
            fs::write(&output, &blob).with_context(|| format!("writing {}", output.display()))?;
            println!("Encrypted {} bytes into {}", data.len(), output.display());
        }
        Commands::EsDecrypt { console_id, input, output } => {
            let container = EsContainer::for_console(parse_console_id(&console_id)?);
            let blob = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let data = container
                .decrypt(&blob)
                .with_context(|| format!("decrypting {}", input.display()))?;
            fs::write(&output, &data).with_context(|| format!("writing {}", output.display()))?;
            println!("Decrypted {} bytes into {}", data.len(), output.display());
        }
        Commands::NandCrypt { cid, console_id, offset, nocash_footer: with_footer, input, output } => {
            let cid: [u8; 16] = parse_hex_array(&cid, "CID")?;
            let console_id = parse_console_id(&console_id)?;
            let nand = NandCrypto::new(&cid, console_id);

            let mut reader = BufReader::new(File::open(&input).with_context(|| format!("opening {}", input.display()))?);
            let mut writer = BufWriter::new(File::create(&output).with_context(|| format!("creating {}", output.display()))?);
            let written = nand.crypt_stream(&mut reader, &mut writer, offset)?;
            if with_footer {
                writer.write_all(&nocash_footer(&cid, console_id))?;
            }
            writer.flush()?;
            println!("Processed 0x{:X} bytes into {}", written, output.display());
        }
    }

    Ok(())
}

fn open_image(path: &Path) -> anyhow::Result<FatVolume<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let volume = FatVolume::open(file)?;
    if !volume.is_formatted() {
        bail!("{} does not contain a FAT volume", path.display());
    }
    Ok(volume)
}

/// Walk `root` and return volume paths of every directory (parents first)
/// and every file with its host path and read-only flag
#[allow(clippy::type_complexity)]
fn collect_tree(root: &Path) -> anyhow::Result<(Vec<String>, Vec<(PathBuf, String, bool)>)> {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((host_dir, volume_dir)) = pending.pop() {
        let mut children: Vec<_> = fs::read_dir(&host_dir)
            .with_context(|| format!("reading {}", host_dir.display()))?
            .collect::<std::io::Result<_>>()?;
        children.sort_by_key(|child| child.file_name());

        let mut subdirectories = Vec::new();
        for child in children {
            let name = child.file_name().to_string_lossy().into_owned();
            let target = format!("{}\\{}", volume_dir, name);
            let metadata = child.metadata()?;
            if metadata.is_dir() {
                directories.push(target.clone());
                subdirectories.push((child.path(), target));
            } else if metadata.is_file() {
                debug!("Queued {} -> {}", child.path().display(), target);
                files.push((child.path(), target, metadata.permissions().readonly()));
            }
        }
        // reversed so the stack pops them in name order
        pending.extend(subdirectories.into_iter().rev());
    }

    Ok((directories, files))
}

fn parse_number(text: &str) -> Result<u64, String> {
    let result = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    result.map_err(|e| format!("invalid number '{}': {}", text, e))
}

fn parse_console_id(text: &str) -> anyhow::Result<u64> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid console id '{}'", text))
}

fn parse_hex_array<const N: usize>(text: &str, what: &str) -> anyhow::Result<[u8; N]> {
    let bytes = hex::decode(text.trim_start_matches("0x")).with_context(|| format!("invalid {} hex", what))?;
    <[u8; N]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow::anyhow!("{} must be {} bytes, got {}", what, N, bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("4096"), Ok(4096));
        assert_eq!(parse_number("0x10EE00"), Ok(0x10EE00));
        assert!(parse_number("0xZZ").is_err());
    }

    #[test]
    fn test_parse_hex_inputs() {
        assert_eq!(parse_console_id("08A1522617110136").unwrap(), 0x08A1_5226_1711_0136);
        let nonce: [u8; 12] = parse_hex_array("a0a1a2a3a4a5a6a7a8a9aaab", "nonce").unwrap();
        assert_eq!(nonce[11], 0xAB);
        assert!(parse_hex_array::<16>("0011", "CID").is_err());
    }

    #[test]
    fn test_collect_tree_orders_parents_first() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("title/00030017")).unwrap();
        fs::write(root.path().join("title/00030017/title.tmd"), b"tmd").unwrap();
        fs::write(root.path().join("readme.txt"), b"hi").unwrap();

        let (directories, files) = collect_tree(root.path()).unwrap();
        assert_eq!(directories, vec!["\\title", "\\title\\00030017"]);
        let targets: Vec<&str> = files.iter().map(|(_, target, _)| target.as_str()).collect();
        assert_eq!(targets, vec!["\\readme.txt", "\\title\\00030017\\title.tmd"]);
    }
}
