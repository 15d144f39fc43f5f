// tests/common/mod.rs
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use espmak::{create_boot_image, FsTree, Options};

pub const SECTOR: usize = 512;
pub const PARTITION_START_LBA: u64 = 34;

pub fn le16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

pub fn le32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn le64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

pub fn build_image(path: &Path, tree: &mut FsTree, label: &str, options: &Options) -> Vec<u8> {
    create_boot_image(path, tree, label, options).expect("image build failed");
    fs::read(path).expect("cannot read back image")
}

pub fn sector(img: &[u8], lba: u64) -> &[u8] {
    &img[lba as usize * SECTOR..(lba as usize + 1) * SECTOR]
}

pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// A read-only view of the EFI System Partition within a built image,
/// decoding just enough of the BPB to locate FAT entries, directories and
/// cluster data.
pub struct FatView<'a> {
    pub part: &'a [u8],
}

impl<'a> FatView<'a> {
    pub fn new(img: &'a [u8]) -> Self {
        let total_sectors = img.len() / SECTOR;
        let start = PARTITION_START_LBA as usize * SECTOR;
        let end = (total_sectors - PARTITION_START_LBA as usize) * SECTOR;
        Self {
            part: &img[start..end],
        }
    }

    pub fn sectors_per_cluster(&self) -> u64 {
        self.part[13] as u64
    }

    pub fn reserved_sectors(&self) -> u64 {
        le16(self.part, 14) as u64
    }

    pub fn num_fats(&self) -> u64 {
        self.part[16] as u64
    }

    pub fn root_entry_count(&self) -> u64 {
        le16(self.part, 17) as u64
    }

    pub fn sectors_per_fat(&self) -> u64 {
        let fat16 = le16(self.part, 22) as u64;
        if fat16 != 0 {
            fat16
        } else {
            le32(self.part, 36) as u64
        }
    }

    pub fn root_dir_sector_count(&self) -> u64 {
        (self.root_entry_count() * 32).div_ceil(SECTOR as u64)
    }

    pub fn first_data_lba(&self) -> u64 {
        self.reserved_sectors() + self.num_fats() * self.sectors_per_fat()
            + self.root_dir_sector_count()
    }

    pub fn root_dir_start_lba(&self) -> u64 {
        if self.root_entry_count() != 0 {
            // FAT16: fixed region after the FATs
            self.reserved_sectors() + self.num_fats() * self.sectors_per_fat()
        } else {
            // FAT32: the root cluster from the extended BPB
            self.cluster_to_lba(le32(self.part, 44))
        }
    }

    pub fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.first_data_lba() + (cluster as u64 - 2) * self.sectors_per_cluster()
    }

    pub fn fat16_entry(&self, index: usize) -> u16 {
        le16(
            self.part,
            self.reserved_sectors() as usize * SECTOR + index * 2,
        )
    }

    pub fn fat32_entry(&self, index: usize) -> u32 {
        le32(
            self.part,
            self.reserved_sectors() as usize * SECTOR + index * 4,
        )
    }

    /// The `index`-th 32-byte entry of the directory region starting at
    /// `lba`.
    pub fn dir_entry(&self, lba: u64, index: usize) -> &[u8] {
        let offset = lba as usize * SECTOR + index * 32;
        &self.part[offset..offset + 32]
    }

    pub fn cluster_bytes(&self, cluster: u32, len: usize) -> &[u8] {
        let offset = self.cluster_to_lba(cluster) as usize * SECTOR;
        &self.part[offset..offset + len]
    }
}
