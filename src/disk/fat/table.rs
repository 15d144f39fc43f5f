// espmak/src/disk/fat/table.rs

use log::debug;

use crate::error::{Error, Result};
use crate::fs_tree::{DirId, EntryId, FsTree, ROOT};
use crate::writer::{SectorWriter, SECTOR_SIZE};

use super::geometry::{FatGeometry, FatType, MEDIA_DESCRIPTOR};
use super::{FAT16_EOC, FAT32_ENTRY_MASK, FAT32_EOC};

/// Streams the File Allocation Table to disk while assigning cluster chains
/// to the tree, depth first. Entries are written into the scratch sector in
/// index order; whenever a sector fills up it is flushed to the next FAT
/// sector. Only the primary FAT copy is written; the mirror region is left
/// zeroed.
pub struct FatTableWriter<'a> {
    writer: &'a mut SectorWriter,
    fat_type: FatType,
    bytes_per_cluster: u64,
    entries_per_cluster: usize,
    entries_per_sector: usize,
    max_cluster_index: u32,
    slot: usize,
    fat_sector: u64,
    next_free_cluster: u32,
}

impl<'a> FatTableWriter<'a> {
    pub fn new(writer: &'a mut SectorWriter, geom: &FatGeometry) -> Self {
        let entries_per_sector = match geom.fat_type {
            FatType::Fat16 => SECTOR_SIZE / 2,
            FatType::Fat32 => SECTOR_SIZE / 4,
        };
        writer.scratch(1);
        Self {
            writer,
            fat_type: geom.fat_type,
            bytes_per_cluster: geom.bytes_per_cluster(),
            entries_per_cluster: geom.entries_per_cluster(),
            entries_per_sector,
            max_cluster_index: geom.max_cluster_index(),
            slot: 0,
            fat_sector: u64::from(geom.reserved_sectors),
            next_free_cluster: 2,
        }
    }

    /// Synthesizes the whole table for `tree` and stores every node's start
    /// cluster back into it.
    pub fn write_table(mut self, tree: &mut FsTree) -> Result<()> {
        let eoc = self.eoc();
        match self.fat_type {
            FatType::Fat16 => {
                self.push_entry(0xFF00 | u32::from(MEDIA_DESCRIPTOR))?;
                self.push_entry(eoc)?;
                // the FAT16 root directory lives outside the cluster area
            }
            FatType::Fat32 => {
                self.push_entry(0x0FFF_FF00 | u32::from(MEDIA_DESCRIPTOR))?;
                self.push_entry(eoc)?;
                // the root directory occupies cluster 2
                tree.set_dir_start_cluster(ROOT, 2);
                self.push_entry(eoc)?;
                self.next_free_cluster = 3;
            }
        }

        self.allocate_dir(tree, ROOT)?;

        if self.slot > 0 {
            self.writer.write_sector_at(self.fat_sector)?;
        }
        Ok(())
    }

    fn allocate_dir(&mut self, tree: &mut FsTree, dir: DirId) -> Result<()> {
        let eoc = self.eoc();
        let children: Vec<(String, EntryId)> = tree
            .children(dir)
            .iter()
            .map(|(name, entry)| (name.clone(), *entry))
            .collect();

        for (name, entry) in children {
            match entry {
                EntryId::Dir(sub) => {
                    assert!(
                        tree.child_count(sub) + 2 <= self.entries_per_cluster,
                        "directory \"{}\" exceeds one cluster",
                        name
                    );
                    let cluster = self.take_cluster()?;
                    tree.set_dir_start_cluster(sub, cluster);
                    self.push_entry(eoc)?;
                    debug!("directory \"{}\" at cluster {}", name, cluster);
                    self.allocate_dir(tree, sub)?;
                }
                EntryId::File(file) => {
                    let size = tree.file_size(file);
                    let num_clusters = size.div_ceil(self.bytes_per_cluster).max(1) as u32;
                    let start = self.next_free_cluster;
                    let last = u64::from(start) + u64::from(num_clusters) - 1;
                    if last > u64::from(self.max_cluster_index) {
                        return Err(Error::out_of_range(format!(
                            "file \"{}\" does not fit the partition",
                            name
                        )));
                    }
                    tree.set_file_start_cluster(file, start);
                    debug!(
                        "{} cluster chain for \"{}\": {}..={}",
                        num_clusters,
                        name,
                        start,
                        start + num_clusters - 1
                    );

                    // each entry points to the next cluster in the chain
                    for n in 1..num_clusters {
                        self.push_entry(start + n)?;
                    }
                    self.push_entry(eoc)?;
                    self.next_free_cluster = start + num_clusters;
                }
            }
        }
        Ok(())
    }

    fn eoc(&self) -> u32 {
        match self.fat_type {
            FatType::Fat16 => u32::from(FAT16_EOC),
            FatType::Fat32 => FAT32_EOC,
        }
    }

    fn take_cluster(&mut self) -> Result<u32> {
        if self.next_free_cluster > self.max_cluster_index {
            return Err(Error::out_of_range(
                "directory tree does not fit the partition",
            ));
        }
        let cluster = self.next_free_cluster;
        self.next_free_cluster += 1;
        Ok(cluster)
    }

    fn push_entry(&mut self, value: u32) -> Result<()> {
        let slot = self.slot;
        let buf = self.writer.scratch_mut();
        match self.fat_type {
            FatType::Fat16 => {
                debug_assert!(value <= 0xFFFF);
                buf[slot * 2..slot * 2 + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            FatType::Fat32 => {
                buf[slot * 4..slot * 4 + 4]
                    .copy_from_slice(&(value & FAT32_ENTRY_MASK).to_le_bytes());
            }
        }
        self.slot += 1;
        self.check_need_new_sector()
    }

    /// Flushes the scratch sector to the current FAT sector when it is full.
    fn check_need_new_sector(&mut self) -> Result<()> {
        if self.slot == self.entries_per_sector {
            self.writer.write_sector_at(self.fat_sector)?;
            self.fat_sector += 1;
            self.slot = 0;
            self.writer.scratch(1);
        }
        Ok(())
    }
}
