// espmak/src/disk/gpt/layout.rs

use crc32fast::Hasher;
use log::debug;

use crate::disk::mbr::write_protective_mbr;
use crate::disk::PartitionWindow;
use crate::error::Result;
use crate::writer::{SectorWriter, SECTOR_SIZE};

use super::header::{GptHeader, GPT_HEADER_SIZE, PARTITION_ARRAY_SECTORS};
use super::partition_entry::{GptPartitionEntry, PARTITION_ENTRY_SIZE};

/// CRC32 of a header with its own `header_crc32` field zeroed, covering
/// exactly `header_size` bytes.
fn header_crc32(header: &GptHeader) -> u32 {
    let mut scrubbed = *header;
    scrubbed.header_crc32 = 0;
    let mut hasher = Hasher::new();
    hasher.update(&scrubbed.to_bytes());
    hasher.finalize()
}

fn partition_array_crc32(entry: &GptPartitionEntry) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&entry.to_bytes());
    hasher.finalize()
}

/// Writes the complete GPT layout onto a blank image:
///
/// | protective MBR | primary header + partition array | ... partition ... |
/// | backup partition array | backup header |
///
/// Returns the usable window the EFI System Partition occupies.
pub fn write_gpt_layout(writer: &mut SectorWriter) -> Result<PartitionWindow> {
    write_protective_mbr(writer)?;
    debug!("...protective mbr");

    let last_lba = writer.last_lba();
    let mut header = GptHeader::new_primary(writer.total_sectors());
    let entry = GptPartitionEntry::efi_system(header.first_usable_lba, header.last_usable_lba);
    header.partition_array_crc32 = partition_array_crc32(&entry);
    header.header_crc32 = header_crc32(&header);

    // header in the first scratch sector, the lone array entry in the second
    let scratch = writer.scratch(2);
    scratch[..GPT_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    scratch[SECTOR_SIZE..SECTOR_SIZE + PARTITION_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
    writer.write_sectors_at(1, 2)?;
    debug!("...GPT + partition array");

    // link back: same header with the LBA cross-references swapped and the
    // array repointed at the tail
    let mut backup = header.to_backup();
    backup.header_crc32 = header_crc32(&backup);
    let scratch = writer.scratch_mut();
    scratch[..GPT_HEADER_SIZE].copy_from_slice(&backup.to_bytes());

    writer.write_sector_range(backup.partition_entry_lba, 1, 1)?;
    writer.write_sector_range(backup.my_lba, 0, 1)?;

    // the unused remainder of both 32-sector array regions must read as
    // zero entries even when an existing image is being reformatted
    let zero_sectors = (PARTITION_ARRAY_SECTORS - 1) as usize;
    writer.scratch(zero_sectors);
    writer.write_sectors_at(3, zero_sectors)?;
    writer.write_sectors_at(last_lba - zero_sectors as u64, zero_sectors)?;
    debug!("...backup GPT and partition array");

    Ok(PartitionWindow {
        first_usable_lba: header.first_usable_lba,
        last_usable_lba: header.last_usable_lba,
    })
}
