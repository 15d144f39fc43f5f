// espmak/src/disk/gpt/partition_entry.rs

use uuid::Uuid;

pub const PARTITION_ENTRY_SIZE: usize = 128;

/// EFI System Partition type GUID C12A7328-F81F-11D2-BA4B-00A0C93EC93B in
/// its on-disk (mixed-endian) byte order.
pub const EFI_SYSTEM_PARTITION_GUID: [u8; 16] = [
    0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9,
    0x3B,
];

/// Bit 0: required partition, must not be deleted or auto-mounted.
pub const ATTR_REQUIRED_PARTITION: u64 = 1;

const PARTITION_NAME_LEN: usize = 72;
const EFI_BOOT_PARTITION_NAME: &[u8] = b"EFI BOOT";

/// A single 128-byte GPT partition entry.
#[derive(Debug, Clone, Copy)]
pub struct GptPartitionEntry {
    pub type_guid: [u8; 16],
    pub part_guid: [u8; 16],
    pub start_lba: u64,
    pub end_lba: u64,
    pub attributes: u64,
    pub name: [u8; PARTITION_NAME_LEN],
}

impl GptPartitionEntry {
    /// The one partition this tool ever writes: the EFI System Partition
    /// spanning the usable window, named "EFI BOOT" with the remainder of
    /// the name field space padded.
    pub fn efi_system(start_lba: u64, end_lba: u64) -> Self {
        let mut name = [0x20u8; PARTITION_NAME_LEN];
        name[..EFI_BOOT_PARTITION_NAME.len()].copy_from_slice(EFI_BOOT_PARTITION_NAME);
        Self {
            type_guid: EFI_SYSTEM_PARTITION_GUID,
            part_guid: Uuid::new_v4().into_bytes(),
            start_lba,
            end_lba,
            attributes: ATTR_REQUIRED_PARTITION,
            name,
        }
    }

    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut bytes = [0u8; PARTITION_ENTRY_SIZE];
        let mut offset = 0;

        bytes[offset..offset + 16].copy_from_slice(&self.type_guid);
        offset += 16;
        bytes[offset..offset + 16].copy_from_slice(&self.part_guid);
        offset += 16;
        bytes[offset..offset + 8].copy_from_slice(&self.start_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.end_lba.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.attributes.to_le_bytes());
        offset += 8;
        bytes[offset..offset + PARTITION_NAME_LEN].copy_from_slice(&self.name);
        offset += PARTITION_NAME_LEN;
        debug_assert_eq!(offset, PARTITION_ENTRY_SIZE);

        bytes
    }
}
