// espmak/src/disk/mod.rs

pub mod fat;
pub mod gpt;
pub mod mbr;

use std::path::Path;

use log::info;

use crate::error::Result;
use crate::fs_tree::FsTree;
use crate::writer::SectorWriter;
use crate::Options;

/// The usable LBA window between the primary GPT structures and the backup
/// structures at the tail; this is where the EFI System Partition lives.
#[derive(Debug, Clone, Copy)]
pub struct PartitionWindow {
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
}

impl PartitionWindow {
    pub fn num_sectors(&self) -> u64 {
        self.last_usable_lba - self.first_usable_lba
    }
}

/// Builds the complete boot image:
///
/// | protective mbr | primary GPT + partition array | EFI System Partition
/// (FAT) | backup partition array + backup GPT |
///
/// The image is sized for the tree (at least 128 MiB), zero-filled unless an
/// existing image is being reformatted in place, and flushed before
/// returning.
pub fn create_boot_image(
    output: &Path,
    tree: &mut FsTree,
    volume_label: &str,
    options: &Options,
) -> Result<()> {
    let mut writer = SectorWriter::create(output, tree.content_bytes(), options.reformat)?;
    if !writer.reused_existing() {
        writer.blank_image()?;
    }

    let window = gpt::write_gpt_layout(&mut writer)?;

    writer.set_origin(window.first_usable_lba);
    fat::create_fat_partition(&mut writer, window.num_sectors(), volume_label, tree)?;

    writer.flush()?;
    info!("boot image created at {}", output.display());
    Ok(())
}
