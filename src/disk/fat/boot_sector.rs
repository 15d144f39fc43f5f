// espmak/src/disk/fat/boot_sector.rs
//
// All of the information needed to understand the FAT format can be found in
// Microsoft's FAT design document (fatgen103).

use crate::writer::SECTOR_SIZE;

use super::geometry::{FatGeometry, FatType, MEDIA_DESCRIPTOR, NUM_FATS, SECTORS_PER_TRACK};

pub const OEM_NAME: &[u8; 8] = b"jOSX 64 ";
pub const LONG_JMP: u8 = 0xE9;
pub const BOOT_SIGNATURE: u16 = 0xAA55;

pub const FAT16_FS_TYPE: &[u8; 8] = b"FAT16   ";
pub const FAT32_FS_TYPE: &[u8; 8] = b"FAT32   ";

/// The extended BPBs indicate the presence of serial, label and fs-type
/// fields with this signature byte.
pub const EXT_BOOT_SIGNATURE: u8 = 0x29;
/// Standard hard-disk drive number.
pub const PHYS_DRIVE_NUMBER: u8 = 0x80;
/// FAT32 flags: no mirroring, FAT 0 is the active copy.
pub const FAT32_FLAGS: u16 = 0x80;
pub const FAT32_ROOT_CLUSTER: u32 = 2;
pub const FAT32_INFORMATION_SECTOR: u16 = 1;

pub const FSINFO_LEAD_SIG: u32 = 0x41615252;
pub const FSINFO_STRUC_SIG: u32 = 0x61417272;
pub const FSINFO_TAIL_SIG: u32 = 0xAA55_0000;

const BPB_SIZE: usize = 25;
const FAT16_EXT_BPB_SIZE: usize = 26;
const FAT32_EXT_BPB_SIZE: usize = 54;
/// The BPB starts right after the jump and OEM name.
const BPB_OFFSET: usize = 11;

/// The common BIOS Parameter Block, offsets 11..36 of the boot sector.
#[derive(Debug, Clone, Copy)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors16: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub num_hidden_sectors: u32,
    pub total_sectors32: u32,
}

impl BiosParameterBlock {
    pub fn from_geometry(geom: &FatGeometry) -> Self {
        Self {
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster: geom.sectors_per_cluster,
            reserved_sectors: geom.reserved_sectors,
            num_fats: NUM_FATS,
            root_entry_count: geom.root_entry_count,
            total_sectors16: geom.total_sectors16(),
            media_descriptor: MEDIA_DESCRIPTOR,
            sectors_per_fat16: match geom.fat_type {
                FatType::Fat16 => geom.sectors_per_fat as u16,
                FatType::Fat32 => 0,
            },
            sectors_per_track: SECTORS_PER_TRACK,
            num_heads: geom.num_heads,
            num_hidden_sectors: 0,
            total_sectors32: geom.total_sectors32(),
        }
    }

    pub fn to_bytes(&self) -> [u8; BPB_SIZE] {
        let mut bytes = [0u8; BPB_SIZE];
        bytes[0..2].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        bytes[2] = self.sectors_per_cluster;
        bytes[3..5].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        bytes[5] = self.num_fats;
        bytes[6..8].copy_from_slice(&self.root_entry_count.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.total_sectors16.to_le_bytes());
        bytes[10] = self.media_descriptor;
        bytes[11..13].copy_from_slice(&self.sectors_per_fat16.to_le_bytes());
        bytes[13..15].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        bytes[15..17].copy_from_slice(&self.num_heads.to_le_bytes());
        bytes[17..21].copy_from_slice(&self.num_hidden_sectors.to_le_bytes());
        bytes[21..25].copy_from_slice(&self.total_sectors32.to_le_bytes());
        bytes
    }
}

/// FAT16 extended BPB, following the common BPB at offset 36.
#[derive(Debug, Clone, Copy)]
pub struct Fat16ExtendedBpb {
    pub drive_num: u8,
    pub boot_sig: u8,
    pub volume_serial: u32,
    pub volume_label: [u8; 11],
    pub file_sys_type: [u8; 8],
}

impl Fat16ExtendedBpb {
    pub fn new(volume_label: [u8; 11], volume_serial: u32) -> Self {
        Self {
            drive_num: PHYS_DRIVE_NUMBER,
            boot_sig: EXT_BOOT_SIGNATURE,
            volume_serial,
            volume_label,
            file_sys_type: *FAT16_FS_TYPE,
        }
    }

    pub fn to_bytes(&self) -> [u8; FAT16_EXT_BPB_SIZE] {
        let mut bytes = [0u8; FAT16_EXT_BPB_SIZE];
        bytes[0] = self.drive_num;
        // bytes[1] reserved
        bytes[2] = self.boot_sig;
        bytes[3..7].copy_from_slice(&self.volume_serial.to_le_bytes());
        bytes[7..18].copy_from_slice(&self.volume_label);
        bytes[18..26].copy_from_slice(&self.file_sys_type);
        bytes
    }
}

/// FAT32 extended BPB, following the common BPB at offset 36.
#[derive(Debug, Clone, Copy)]
pub struct Fat32ExtendedBpb {
    pub sectors_per_fat: u32,
    pub flags: u16,
    pub version: u16,
    pub root_cluster: u32,
    pub information_sector: u16,
    pub boot_copy_sector: u16,
    pub phys_drive_number: u8,
    pub ext_boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub file_system_type: [u8; 8],
}

impl Fat32ExtendedBpb {
    pub fn new(sectors_per_fat: u32, volume_label: [u8; 11], volume_id: u32) -> Self {
        Self {
            sectors_per_fat,
            flags: FAT32_FLAGS,
            version: 0,
            root_cluster: FAT32_ROOT_CLUSTER,
            information_sector: FAT32_INFORMATION_SECTOR,
            boot_copy_sector: 0,
            phys_drive_number: PHYS_DRIVE_NUMBER,
            ext_boot_signature: EXT_BOOT_SIGNATURE,
            volume_id,
            volume_label,
            file_system_type: *FAT32_FS_TYPE,
        }
    }

    pub fn to_bytes(&self) -> [u8; FAT32_EXT_BPB_SIZE] {
        let mut bytes = [0u8; FAT32_EXT_BPB_SIZE];
        bytes[0..4].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.flags.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.root_cluster.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.information_sector.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.boot_copy_sector.to_le_bytes());
        // bytes[16..28] reserved
        bytes[28] = self.phys_drive_number;
        // bytes[29] unused
        bytes[30] = self.ext_boot_signature;
        bytes[31..35].copy_from_slice(&self.volume_id.to_le_bytes());
        bytes[35..46].copy_from_slice(&self.volume_label);
        bytes[46..54].copy_from_slice(&self.file_system_type);
        bytes
    }
}

/// The FAT32 FSInfo sector. Free-cluster hints stay zero on a freshly
/// written, never edited image.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInfoSector {
    pub free_count: u32,
    pub next_free: u32,
}

impl FsInfoSector {
    pub fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        let mut bytes = [0u8; SECTOR_SIZE];
        bytes[0..4].copy_from_slice(&FSINFO_LEAD_SIG.to_le_bytes());
        bytes[484..488].copy_from_slice(&FSINFO_STRUC_SIG.to_le_bytes());
        bytes[488..492].copy_from_slice(&self.free_count.to_le_bytes());
        bytes[492..496].copy_from_slice(&self.next_free.to_le_bytes());
        bytes[508..512].copy_from_slice(&FSINFO_TAIL_SIG.to_le_bytes());
        bytes
    }
}

/// Assembles the full 512-byte boot sector for the given geometry.
pub fn build_boot_sector(
    geom: &FatGeometry,
    volume_label: [u8; 11],
    volume_serial: u32,
) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    // the jump is never executed but should still look valid
    sector[0] = LONG_JMP;
    sector[3..11].copy_from_slice(OEM_NAME);
    sector[BPB_OFFSET..BPB_OFFSET + BPB_SIZE]
        .copy_from_slice(&BiosParameterBlock::from_geometry(geom).to_bytes());

    let ext_offset = BPB_OFFSET + BPB_SIZE;
    match geom.fat_type {
        FatType::Fat16 => {
            let ext = Fat16ExtendedBpb::new(volume_label, volume_serial);
            sector[ext_offset..ext_offset + FAT16_EXT_BPB_SIZE].copy_from_slice(&ext.to_bytes());
        }
        FatType::Fat32 => {
            let ext = Fat32ExtendedBpb::new(geom.sectors_per_fat, volume_label, volume_serial);
            sector[ext_offset..ext_offset + FAT32_EXT_BPB_SIZE].copy_from_slice(&ext.to_bytes());
        }
    }

    sector[510..512].copy_from_slice(&BOOT_SIGNATURE.to_le_bytes());
    sector
}
