// File-backed FatVolume integration tests

use std::fs::OpenOptions;

use nandgen_core::NandGenError;
use nandgen_filesystems::{FatType, FatVolume, VbrOptions};
use tempfile::NamedTempFile;

fn create_test_image(size: u64) -> Result<NamedTempFile, std::io::Error> {
    let file = NamedTempFile::new()?;
    file.as_file().set_len(size)?;
    Ok(file)
}

#[test]
fn test_240mib_volume_geometry() {
    let _ = env_logger::builder().is_test(true).try_init();

    let size = 240 * 1024 * 1024;
    let image = create_test_image(size).unwrap();
    let file = OpenOptions::new().read(true).write(true).open(image.path()).unwrap();

    let mut volume = FatVolume::open(file).unwrap();
    assert!(!volume.is_formatted());

    let geometry = volume.format(0x10EE00, 1, None).unwrap();
    assert_eq!(volume.fat_type().unwrap(), FatType::Fat16);
    assert_eq!(geometry.sectors_per_fat, 61);
    assert_eq!(geometry.root_dir_start_sector, 123);
    assert_eq!(geometry.data_start_sector, 155);
    assert_eq!(geometry.data_clusters(), 15355);
    assert!(geometry.sectors_to_bytes(geometry.data_start_sector + geometry.data_sectors) <= size);

    let vbr = volume.vbr().unwrap();
    assert_eq!(vbr.hidden_sectors, 0x877);
    assert_eq!(vbr.total_sectors, 491520);
    assert_eq!(vbr.oem_name(), "TWL");

    // reopening the same file finds the same layout
    drop(volume);
    let file = OpenOptions::new().read(true).write(true).open(image.path()).unwrap();
    let reopened = FatVolume::open(file).unwrap();
    assert!(reopened.is_formatted());
    assert_eq!(reopened.geometry().unwrap(), &geometry);
}

#[test]
fn test_file_backed_tree() {
    let image = create_test_image(16 * 1024 * 1024).unwrap();
    let file = OpenOptions::new().read(true).write(true).open(image.path()).unwrap();
    let mut volume = FatVolume::open(file).unwrap();
    volume.format(0, 0, None).unwrap();

    let tmd = vec![0x5Au8; 520];
    let app: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();

    volume.create_directory("\\title").unwrap();
    volume.create_directory("\\title\\00030017").unwrap();
    volume.create_directory("\\title\\00030017\\484e4145").unwrap();
    volume.create_directory("\\title\\00030017\\484e4145\\content").unwrap();
    volume
        .create_file("\\title\\00030017\\484e4145\\content\\title.tmd", &tmd, false)
        .unwrap();
    volume
        .create_file("\\title\\00030017\\484e4145\\content\\00000002.app", &app, true)
        .unwrap();

    let listing = volume.entries("\\title\\00030017\\484e4145\\content").unwrap();
    let names: Vec<String> = listing.iter().map(|entry| entry.name.clone()).collect();
    assert_eq!(names, vec![".", "..", "title.tmd", "00000002.app"]);

    drop(volume);
    let file = OpenOptions::new().read(true).write(true).open(image.path()).unwrap();
    let mut volume = FatVolume::open(file).unwrap();
    assert_eq!(
        volume.read_file("\\TITLE\\00030017\\484E4145\\CONTENT\\00000002.APP").unwrap(),
        app
    );
    assert!(volume.entry("\\title\\00030017\\484e4145\\content\\00000002.app").unwrap().is_read_only());
    assert!(matches!(
        volume.read_file("\\title\\missing.bin"),
        Err(NandGenError::EntryNotFound(_))
    ));
}

#[test]
fn test_vbr_options_from_json() {
    let options: VbrOptions = serde_json::from_str(r#"{ "oem_name": "MSWIN4.1", "sectors_per_cluster": 8 }"#).unwrap();
    assert_eq!(options.sectors_per_cluster, 8);
    assert_eq!(options.bytes_per_sector, 512);
    assert_eq!(options.num_fats, 2);

    let image = create_test_image(8 * 1024 * 1024).unwrap();
    let file = OpenOptions::new().read(true).write(true).open(image.path()).unwrap();
    let mut volume = FatVolume::open(file).unwrap();
    volume.format(0, 0, Some(&options)).unwrap();

    // 16384 sectors / 8 = 2048 clusters
    assert_eq!(volume.fat_type().unwrap(), FatType::Fat12);
    assert_eq!(volume.vbr().unwrap().oem_name(), "MSWIN4.1");
    assert_eq!(volume.geometry().unwrap().sectors_per_fat, 9);
}
