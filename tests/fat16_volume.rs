// tests/fat16_volume.rs
//
// FAT16 volume scenarios on complete built images: boot sector geometry,
// FAT chains, directory entries and file data placement.

mod common;

use common::*;
use espmak::fs_tree::ROOT;
use espmak::{FsTree, Options};

#[test]
fn test_empty_tree_default_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.img");
    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    assert_eq!(img.len(), 0x800_0000, "128 MiB image");

    let fat = FatView::new(&img);
    // FAT16 was chosen: the 16-bit sectors-per-FAT field carries the count
    assert_ne!(le16(fat.part, 22), 0);
    assert_eq!(fat.sectors_per_cluster(), 4);
    assert_eq!(fat.reserved_sectors(), 1);
    assert_eq!(fat.root_entry_count(), 512);
    assert_eq!(&fat.part[54..62], b"FAT16   ");

    // the only root entry is the volume label
    let root = fat.root_dir_start_lba();
    let label = fat.dir_entry(root, 0);
    assert_eq!(&label[0..11], b"NOLABEL    ");
    assert_eq!(label[11], 0x08);
    assert!(fat.dir_entry(root, 1).iter().all(|&b| b == 0));
}

#[test]
fn test_single_small_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("boot.img");
    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let efi = tree.create_directory(ROOT, "EFI").unwrap();
    let boot = tree.create_directory(efi, "BOOT").unwrap();
    tree.create_file(boot, "BOOTX64.EFI", vec![0xDE, 0xAD, 0xBE, 0xEF])
        .unwrap();
    let img = build_image(&path, &mut tree, "EFI BOOT", &options);

    let fat = FatView::new(&img);
    // EFI, BOOT and the payload occupy clusters 2, 3 and 4
    for index in 0..5 {
        assert_eq!(fat.fat16_entry(index), 0xFFF8, "FAT entry {}", index);
    }
    assert_eq!(fat.fat16_entry(5), 0);

    // root: volume label then EFI
    let root = fat.root_dir_start_lba();
    assert_eq!(&fat.dir_entry(root, 0)[0..11], b"EFI BOOT   ");
    assert_eq!(fat.dir_entry(root, 0)[11], 0x08);
    let efi_entry = fat.dir_entry(root, 1);
    assert_eq!(&efi_entry[0..11], b"EFI        ");
    assert_eq!(efi_entry[11], 0x10);
    assert_eq!(le16(efi_entry, 26), 2, "EFI first cluster");

    // EFI directory: '.', '..' and BOOT
    let efi_lba = fat.cluster_to_lba(2);
    assert_eq!(&fat.dir_entry(efi_lba, 0)[0..11], b".          ");
    assert_eq!(le16(fat.dir_entry(efi_lba, 0), 26), 2);
    assert_eq!(&fat.dir_entry(efi_lba, 1)[0..11], b"..         ");
    assert_eq!(le16(fat.dir_entry(efi_lba, 1), 26), 0);
    let boot_entry = fat.dir_entry(efi_lba, 2);
    assert_eq!(&boot_entry[0..11], b"BOOT       ");
    assert_eq!(le16(boot_entry, 26), 3);

    // BOOT directory: '.', '..' and the payload
    let boot_lba = fat.cluster_to_lba(3);
    assert_eq!(le16(fat.dir_entry(boot_lba, 0), 26), 3);
    assert_eq!(le16(fat.dir_entry(boot_lba, 1), 26), 2);
    let payload_entry = fat.dir_entry(boot_lba, 2);
    assert_eq!(&payload_entry[0..11], b"BOOTX64 EFI");
    assert_eq!(payload_entry[11], 0);
    assert_eq!(le16(payload_entry, 26), 4);
    assert_eq!(le32(payload_entry, 28), 4, "file size");

    // the four payload bytes followed by zero padding
    let data = fat.cluster_bytes(4, SECTOR);
    assert_eq!(&data[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(data[4..].iter().all(|&b| b == 0));
}

#[test]
fn test_nested_directories_allocate_depth_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested.img");
    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let a = tree.create_directory(ROOT, "A").unwrap();
    let b = tree.create_directory(a, "B").unwrap();
    let c = tree.create_directory(b, "C").unwrap();
    tree.create_file(c, "FILE.BIN", vec![0x42]).unwrap();
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    let fat = FatView::new(&img);
    // A=2, B=3, C=4, FILE.BIN=5
    for index in 2..6 {
        assert_eq!(fat.fat16_entry(index), 0xFFF8);
    }

    let expectations = [
        // (cluster, dot target, dotdot target)
        (2u32, 2u16, 0u16), // A: parent is the root
        (3, 3, 2),          // B inside A
        (4, 4, 3),          // C inside B
    ];
    for (cluster, dot, dotdot) in expectations {
        let lba = fat.cluster_to_lba(cluster);
        let dot_entry = fat.dir_entry(lba, 0);
        assert_eq!(&dot_entry[0..11], b".          ");
        assert_eq!(dot_entry[11], 0x10);
        assert_eq!(le16(dot_entry, 26), dot);
        let dotdot_entry = fat.dir_entry(lba, 1);
        assert_eq!(&dotdot_entry[0..11], b"..         ");
        assert_eq!(dotdot_entry[11], 0x10);
        assert_eq!(le16(dotdot_entry, 26), dotdot);
    }

    let file_entry = fat.dir_entry(fat.cluster_to_lba(4), 2);
    assert_eq!(&file_entry[0..11], b"FILE    BIN");
    assert_eq!(le16(file_entry, 26), 5);
    assert_eq!(le32(file_entry, 28), 1);

    let data = fat.cluster_bytes(5, SECTOR);
    assert_eq!(data[0], 0x42);
    assert!(data[1..].iter().all(|&b| b == 0));
}

#[test]
fn test_file_spanning_two_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("span.img");
    let options = Options::default();
    let mut tree = FsTree::new(&options);
    let efi = tree.create_directory(ROOT, "EFI").unwrap();
    let boot = tree.create_directory(efi, "BOOT").unwrap();

    // one byte beyond a full cluster (4 sectors on this geometry)
    let bytes_per_cluster = 4 * SECTOR;
    let payload: Vec<u8> = (0..bytes_per_cluster + 1).map(|i| (i % 251) as u8).collect();
    tree.create_file(boot, "BIG.BIN", payload.clone()).unwrap();
    let img = build_image(&path, &mut tree, "NOLABEL", &options);

    let fat = FatView::new(&img);
    assert_eq!(fat.sectors_per_cluster() as usize * SECTOR, bytes_per_cluster);

    // EFI=2, BOOT=3, BIG.BIN=4->5
    let start = 4;
    assert_eq!(fat.fat16_entry(start), 5);
    assert_eq!(fat.fat16_entry(start + 1), 0xFFF8);
    assert_eq!(fat.fat16_entry(start + 2), 0);

    // a full cluster of payload, then one byte and zero padding
    let first = fat.cluster_bytes(4, bytes_per_cluster);
    assert_eq!(first, &payload[..bytes_per_cluster]);
    let tail = fat.cluster_bytes(5, SECTOR);
    assert_eq!(tail[0], payload[bytes_per_cluster]);
    assert!(tail[1..].iter().all(|&b| b == 0));
}
