// espmak/src/disk/gpt/header.rs

use uuid::Uuid;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
/// Bytes of the header actually used; the rest of the sector is zero.
pub const GPT_HEADER_SIZE: usize = 92;

/// First LBA a partition may occupy with 512-byte sectors: 1 for the
/// protective MBR, 1 for the header, 32 for the 16-KiB entry array.
pub const FIRST_USABLE_LBA: u64 = 34;
/// Sectors reserved at the tail for the backup entry array.
pub const PARTITION_ARRAY_SECTORS: u64 = 32;

/// GPT header, primary or backup depending on the LBA fields.
#[derive(Debug, Clone, Copy)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: [u8; 16],
    pub partition_entry_lba: u64,
    pub partition_entry_count: u32,
    pub partition_entry_size: u32,
    pub partition_array_crc32: u32,
}

impl GptHeader {
    /// Builds the primary header for a disk of `total_sectors` sectors with
    /// a single partition entry at LBA 2. CRC fields start zeroed.
    pub fn new_primary(total_sectors: u64) -> Self {
        let last_lba = total_sectors - 1;
        Self {
            signature: *GPT_SIGNATURE,
            revision: GPT_REVISION,
            header_size: GPT_HEADER_SIZE as u32,
            header_crc32: 0,
            my_lba: 1,
            alternate_lba: last_lba,
            first_usable_lba: FIRST_USABLE_LBA,
            // the tail mirrors the head: 32 sectors of backup array plus the
            // backup header itself, minus the MBR slot
            last_usable_lba: total_sectors - FIRST_USABLE_LBA,
            disk_guid: Uuid::new_v4().into_bytes(),
            partition_entry_lba: 2,
            partition_entry_count: 1,
            partition_entry_size: super::partition_entry::PARTITION_ENTRY_SIZE as u32,
            partition_array_crc32: 0,
        }
    }

    /// Derives the backup header: LBA cross-references swapped and the entry
    /// array repointed at the 32 sectors preceding the final LBA. The header
    /// CRC is left for the caller to recompute.
    pub fn to_backup(mut self) -> Self {
        std::mem::swap(&mut self.my_lba, &mut self.alternate_lba);
        self.partition_entry_lba = self.my_lba - PARTITION_ARRAY_SECTORS;
        self.header_crc32 = 0;
        self
    }

    pub fn to_bytes(&self) -> [u8; GPT_HEADER_SIZE] {
        let mut bytes = [0u8; GPT_HEADER_SIZE];
        let mut offset = 0;

        bytes[offset..offset + 8].copy_from_slice(&self.signature);
        offset += 8;
        bytes[offset..offset + 4].copy_from_slice(&self.revision.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 4].copy_from_slice(&self.header_size.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 4].copy_from_slice(&self.header_crc32.to_le_bytes());
        offset += 4;
        // reserved, always zero
        offset += 4;
        bytes[offset..offset + 8].copy_from_slice(&self.my_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.alternate_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.first_usable_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.last_usable_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 16].copy_from_slice(&self.disk_guid);
        offset += 16;
        bytes[offset..offset + 8].copy_from_slice(&self.partition_entry_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 4].copy_from_slice(&self.partition_entry_count.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 4].copy_from_slice(&self.partition_entry_size.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 4].copy_from_slice(&self.partition_array_crc32.to_le_bytes());
        offset += 4;
        debug_assert_eq!(offset, GPT_HEADER_SIZE);

        bytes
    }
}
