// espmak/src/lib.rs

//! Synthesizes a bootable UEFI disk image: a protective MBR, a primary and
//! backup GUID Partition Table, and a single EFI System Partition formatted
//! as FAT16 or FAT32 and populated from an in-memory directory tree.
//!
//! The emitted layouts follow the UEFI specification (GPT) and Microsoft's
//! FAT design document bit for bit; images are directly bootable when
//! written to a disk or attached as a virtual drive.

pub mod disk;
pub mod error;
pub mod fs_tree;
pub mod writer;

pub use crate::disk::{create_boot_image, PartitionWindow};
pub use crate::error::{Code, Error, Result};
pub use crate::fs_tree::FsTree;
pub use crate::writer::SectorWriter;

/// Build options, configured once before emission begins and read-only
/// afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Emit more information about the build process.
    pub verbose: bool,
    /// Preserve source file name cases instead of converting to upper case.
    pub preserve_case: bool,
    /// Re-use an existing output image when it is large enough.
    pub reformat: bool,
}
