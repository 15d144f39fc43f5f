// tests/image_tool.rs
//
// End-to-end behaviour of the image tool: reformat re-use of an existing
// image and interoperability of the emitted volume with an independent FAT
// implementation.

mod common;

use std::fs;
use std::io::{Cursor, Read};

use common::*;
use espmak::fs_tree::ROOT;
use espmak::{FsTree, Options};

#[test]
fn test_reformat_reuses_and_overwrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reuse.img");

    // an existing, oversized image full of stale bytes
    const EXISTING_BYTES: usize = 2 * 0x800_0000;
    fs::write(&path, vec![0xAAu8; EXISTING_BYTES]).unwrap();

    let options = Options {
        reformat: true,
        ..Options::default()
    };
    let mut tree = FsTree::new(&options);
    tree.create_directory(ROOT, "EFI").unwrap();
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    // not truncated: the existing size was kept
    assert_eq!(img.len(), EXISTING_BYTES);
    let total = img.len() as u64 / SECTOR as u64;

    // the layout was rewritten in place and still verifies
    assert_eq!(&sector(&img, 0)[510..512], &[0x55, 0xAA]);
    for lba in [1, total - 1] {
        let header = sector(&img, lba);
        assert_eq!(&header[0..8], b"EFI PART");
        let stored = le32(header, 16);
        let mut scrubbed = header[..92].to_vec();
        scrubbed[16..20].fill(0);
        assert_eq!(crc32(&scrubbed), stored, "header CRC at lba {}", lba);
    }
    assert_eq!(le64(sector(&img, 1), 32), total - 1);

    let fat = FatView::new(&img);
    let root = fat.root_dir_start_lba();
    assert_eq!(&fat.dir_entry(root, 0)[0..11], b"NOLABEL    ");

    // the blank fill was skipped: the redundant FAT copy region, which the
    // formatter never writes, still holds the stale pattern
    let second_fat_mid =
        (fat.reserved_sectors() + fat.sectors_per_fat() + fat.sectors_per_fat() / 2) as usize;
    assert_eq!(fat.part[second_fat_mid * SECTOR], 0xAA);
}

#[test]
fn test_without_reformat_the_image_is_rebuilt_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.img");
    fs::write(&path, vec![0xAAu8; 2 * 0x800_0000]).unwrap();

    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    // truncated back to the minimum size and fully blank-filled
    assert_eq!(img.len(), 0x800_0000);
    let fat = FatView::new(&img);
    let second_fat_mid =
        (fat.reserved_sectors() + fat.sectors_per_fat() + fat.sectors_per_fat() / 2) as usize;
    assert!(fat.part[second_fat_mid * SECTOR..][..SECTOR]
        .iter()
        .all(|&b| b == 0));
}

#[test]
fn test_emitted_volume_mounts_with_an_independent_fat_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interop.img");

    let payload: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let efi = tree.create_directory(ROOT, "efi").unwrap();
    let boot = tree.create_directory(efi, "boot").unwrap();
    tree.create_file(boot, "bootx64.efi", payload.clone())
        .unwrap();
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    let fat_view = FatView::new(&img);
    let partition = fat_view.part.to_vec();

    let fs = fatfs::FileSystem::new(Cursor::new(partition), fatfs::FsOptions::new())
        .expect("fatfs cannot mount the emitted partition");
    assert_eq!(fs.fat_type(), fatfs::FatType::Fat16);
    assert_eq!(fs.volume_label(), "NOLABEL");

    let root_dir = fs.root_dir();
    let mut file = root_dir
        .open_file("EFI/BOOT/BOOTX64.EFI")
        .expect("canonical boot path missing");
    let mut read_back = Vec::new();
    file.read_to_end(&mut read_back).unwrap();
    assert_eq!(read_back, payload);
}
