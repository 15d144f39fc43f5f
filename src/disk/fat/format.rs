// espmak/src/disk/fat/format.rs

use log::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fs_tree::{short_name, DirId, EntryId, FileId, FsTree, ROOT, SHORT_NAME_LEN};
use crate::writer::{SectorWriter, SECTOR_SIZE};

use super::boot_sector::{build_boot_sector, FsInfoSector, FAT32_INFORMATION_SECTOR};
use super::dir_entry::{pad_label, DirEntry, DIR_ENTRY_SIZE};
use super::geometry::{FatGeometry, FatType, MIN_FAT16_CLUSTERS};
use super::table::FatTableWriter;

/// Formats the partition under the writer's current origin as FAT16 or
/// FAT32 (picked by partition size) and lays out the contents of `tree`.
///
/// Emission order: boot sector, FSInfo (FAT32 only), the FAT, the root
/// directory, then every subdirectory and file depth first in the same
/// order the FAT walk assigned clusters.
pub fn create_fat_partition(
    writer: &mut SectorWriter,
    total_sectors: u64,
    volume_label: &str,
    tree: &mut FsTree,
) -> Result<()> {
    if !writer.is_good() || total_sectors == 0 {
        return Err(Error::failed_precondition(
            "FAT formatter needs a usable writer and a non-empty partition",
        ));
    }
    let label = validate_label(volume_label)?;
    let geom = FatGeometry::compute(total_sectors)?;
    if geom.fat_type == FatType::Fat16 && geom.cluster_count() < MIN_FAT16_CLUSTERS {
        return Err(Error::unimplemented(format!(
            "a volume of {} clusters would be FAT12, which is not supported",
            geom.cluster_count()
        )));
    }
    debug!(
        "filesystem is {}, {} sectors, {} sectors per cluster, {} sectors per FAT",
        match geom.fat_type {
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        },
        geom.total_sectors,
        geom.sectors_per_cluster,
        geom.sectors_per_fat
    );

    let boot_sector = build_boot_sector(&geom, label, volume_serial());
    writer.scratch(1).copy_from_slice(&boot_sector);
    writer
        .write_sector_at(0)
        .map_err(|e| Error::internal(format!("boot sector write failed: {}", e)))?;

    if geom.fat_type == FatType::Fat32 {
        let fsinfo = FsInfoSector::default();
        writer.scratch(1).copy_from_slice(&fsinfo.to_bytes());
        writer.write_sector_at(u64::from(FAT32_INFORMATION_SECTOR))?;
    }

    FatTableWriter::new(writer, &geom).write_table(tree)?;

    write_root_directory(writer, &geom, label, tree)
}

/// Blank-pads the volume label to 11 bytes; longer or non-ASCII labels are
/// rejected rather than truncated.
fn validate_label(label: &str) -> Result<[u8; SHORT_NAME_LEN]> {
    if !label.is_ascii() || label.is_empty() || label.len() > SHORT_NAME_LEN {
        return Err(Error::invalid_argument(format!(
            "volume label \"{}\" must be 1 to {} ASCII characters",
            label, SHORT_NAME_LEN
        )));
    }
    Ok(pad_label(label))
}

fn volume_serial() -> u32 {
    let bytes = Uuid::new_v4().into_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn child_entry(tree: &FsTree, name: &str, entry: EntryId) -> Result<DirEntry> {
    match entry {
        EntryId::Dir(dir) => {
            let cluster = tree.dir_start_cluster(dir);
            debug!("\tadded directory \"{}\", starting at cluster {}", name, cluster);
            Ok(DirEntry::directory(short_name(name), cluster))
        }
        EntryId::File(file) => {
            let size = u32::try_from(tree.file_size(file)).map_err(|_| {
                Error::out_of_range(format!("file \"{}\" exceeds the FAT size field", name))
            })?;
            let cluster = tree.file_start_cluster(file);
            debug!(
                "\tadded file \"{}\", {} bytes, starting at cluster {}",
                name, size, cluster
            );
            Ok(DirEntry::file(short_name(name), cluster, size))
        }
    }
}

/// The root directory is special: its first entry is the volume label and
/// it has no `.` or `..` entries. On FAT16 it occupies the fixed region
/// after the FATs, on FAT32 it occupies cluster 2.
fn write_root_directory(
    writer: &mut SectorWriter,
    geom: &FatGeometry,
    label: [u8; SHORT_NAME_LEN],
    tree: &FsTree,
) -> Result<()> {
    let (capacity, sectors) = match geom.fat_type {
        FatType::Fat16 => (
            geom.root_entry_count as usize,
            geom.root_dir_sector_count() as usize,
        ),
        FatType::Fat32 => (geom.entries_per_cluster(), geom.sectors_per_cluster as usize),
    };
    assert!(
        tree.child_count(ROOT) + 1 <= capacity,
        "root directory exceeds {} entries",
        capacity
    );
    debug!("volume label \"{}\"", String::from_utf8_lossy(&label));

    let mut entries = vec![DirEntry::volume_label(label)];
    for (name, entry) in tree.children(ROOT) {
        entries.push(child_entry(tree, name, *entry)?);
    }
    blit_entries(writer, &entries, sectors);
    writer.write_sectors_at(geom.root_dir_start_lba(), sectors)?;

    write_children(writer, geom, tree, ROOT)
}

/// Every non-root directory opens with `.` and `..`; `..` names cluster 0
/// when the parent is the root.
fn write_directory(
    writer: &mut SectorWriter,
    geom: &FatGeometry,
    tree: &FsTree,
    dir: DirId,
) -> Result<()> {
    let start = tree.dir_start_cluster(dir);
    let parent = tree.dir_parent(dir);
    let parent_cluster = if parent == ROOT {
        0
    } else {
        tree.dir_start_cluster(parent)
    };

    let mut entries = vec![DirEntry::dot(".", start), DirEntry::dot("..", parent_cluster)];
    for (name, entry) in tree.children(dir) {
        entries.push(child_entry(tree, name, *entry)?);
    }

    let sectors = geom.sectors_per_cluster as usize;
    blit_entries(writer, &entries, sectors);
    writer.write_sectors_at(geom.cluster_to_lba(start), sectors)?;

    write_children(writer, geom, tree, dir)
}

fn write_children(
    writer: &mut SectorWriter,
    geom: &FatGeometry,
    tree: &FsTree,
    dir: DirId,
) -> Result<()> {
    for entry in tree.children(dir).values() {
        match entry {
            EntryId::Dir(sub) => write_directory(writer, geom, tree, *sub)?,
            EntryId::File(file) => write_file_data(writer, geom, tree, *file)?,
        }
    }
    Ok(())
}

/// Copies file contents sector by sector into the cluster chain; the final
/// partial sector is zero padded.
fn write_file_data(
    writer: &mut SectorWriter,
    geom: &FatGeometry,
    tree: &FsTree,
    file: FileId,
) -> Result<()> {
    let data = tree.file_data(file);
    let start = tree.file_start_cluster(file);
    let mut lba = geom.cluster_to_lba(start);
    debug!(
        "\tfile of {} bytes starts at cluster {}, sector {}",
        data.len(),
        start,
        lba
    );

    let mut chunks = data.chunks_exact(SECTOR_SIZE);
    for chunk in chunks.by_ref() {
        writer.scratch(1).copy_from_slice(chunk);
        writer.write_sector_at(lba)?;
        lba += 1;
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let sector = writer.scratch(1);
        sector[..tail.len()].copy_from_slice(tail);
        writer.write_sector_at(lba)?;
    }
    Ok(())
}

fn blit_entries(writer: &mut SectorWriter, entries: &[DirEntry], sectors: usize) {
    let buf = writer.scratch(sectors);
    for (i, entry) in entries.iter().enumerate() {
        buf[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
    }
}
