// espmak/src/writer.rs

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};

/// The only sector size supported here. UEFI allows others but all of the
/// reference literature assumes 512 bytes.
pub const SECTOR_SIZE: usize = 512;

/// Images are sized in multiples of 128 MiB, which keeps us well out of the
/// floppy-disk geometry domain.
const IMAGE_GRANULARITY: u64 = 0x800_0000;

/// Random-access writer over the output file in units of 512-byte sectors.
///
/// The writer owns a zeroed scratch buffer of one or more sectors and an
/// origin LBA; all write positions are relative to the origin so the same
/// writer serves whole-disk addressing (GPT) and partition-relative
/// addressing (FAT). A failed write poisons the writer: every later write
/// fails fast with `FAILED_PRECONDITION`.
pub struct SectorWriter {
    file: File,
    scratch: Vec<u8>,
    scratch_len: usize,
    total_sectors: u64,
    origin_lba: u64,
    reused_existing: bool,
    good: bool,
}

impl SectorWriter {
    /// Opens (or re-uses) the output image sized for `content_bytes` of
    /// payload: at least 128 MiB, rounded up to the 128-MiB granularity.
    ///
    /// With `reformat` set, an existing image at `path` is kept as long as it
    /// is at least as large as the computed size; the caller is expected to
    /// skip the blank fill in that case.
    pub fn create(path: &Path, content_bytes: u64, reformat: bool) -> Result<Self> {
        let mut size = content_bytes
            .max(IMAGE_GRANULARITY)
            .div_ceil(IMAGE_GRANULARITY)
            * IMAGE_GRANULARITY;

        let mut reused_existing = false;
        let mut file = None;
        if reformat {
            if let Ok(existing) = OpenOptions::new().read(true).write(true).open(path) {
                let existing_size = existing
                    .metadata()
                    .map_err(|e| {
                        Error::not_found(format!("cannot stat {}: {}", path.display(), e))
                    })?
                    .len();
                if existing_size >= size {
                    debug!("re-using existing disk image {}", path.display());
                    size = existing_size;
                    reused_existing = true;
                    file = Some(existing);
                }
            }
        }

        let file = match file {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| {
                    Error::not_found(format!("cannot open output image {}: {}", path.display(), e))
                })?,
        };

        let size = size.div_ceil(SECTOR_SIZE as u64) * SECTOR_SIZE as u64;
        Ok(Self {
            file,
            scratch: Vec::new(),
            scratch_len: 0,
            total_sectors: size / SECTOR_SIZE as u64,
            origin_lba: 0,
            reused_existing,
            good: true,
        })
    }

    /// Opens a writer over a fresh image of exactly `total_sectors` sectors.
    ///
    /// The file is extended sparsely rather than zero-filled; callers that
    /// need every sector written (rather than read back as holes) should use
    /// [`SectorWriter::blank_image`].
    pub fn open_with_total_sectors(path: &Path, total_sectors: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                Error::not_found(format!("cannot open output image {}: {}", path.display(), e))
            })?;
        file.set_len(total_sectors * SECTOR_SIZE as u64)
            .map_err(|e| {
                Error::not_found(format!("cannot size output image {}: {}", path.display(), e))
            })?;
        Ok(Self {
            file,
            scratch: Vec::new(),
            scratch_len: 0,
            total_sectors,
            origin_lba: 0,
            reused_existing: false,
            good: true,
        })
    }

    /// Establishes LBA 0 for subsequent writes.
    pub fn set_origin(&mut self, absolute_lba: u64) {
        self.origin_lba = absolute_lba;
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn last_lba(&self) -> u64 {
        self.total_sectors - 1
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_sectors * SECTOR_SIZE as u64
    }

    pub fn is_good(&self) -> bool {
        self.good
    }

    pub fn reused_existing(&self) -> bool {
        self.reused_existing
    }

    /// Returns a zeroed scratch buffer of `sectors` sectors. The allocation
    /// only ever grows; requesting fewer sectors shrinks the logical length.
    pub fn scratch(&mut self, sectors: usize) -> &mut [u8] {
        let bytes = sectors * SECTOR_SIZE;
        if self.scratch.len() < bytes {
            self.scratch.resize(bytes, 0);
        }
        self.scratch_len = bytes;
        let buf = &mut self.scratch[..bytes];
        buf.fill(0);
        buf
    }

    /// The current scratch buffer, without re-zeroing it.
    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch[..self.scratch_len]
    }

    /// Writes the first scratch sector at origin + `lba`.
    pub fn write_sector_at(&mut self, lba: u64) -> Result<()> {
        self.write_sector_range(lba, 0, 1)
    }

    /// Writes the first `count` scratch sectors at origin + `lba`.
    pub fn write_sectors_at(&mut self, lba: u64, count: usize) -> Result<()> {
        self.write_sector_range(lba, 0, count)
    }

    /// Writes `count` sectors starting at scratch sector `src_sector_offset`
    /// to origin + `lba`.
    pub fn write_sector_range(
        &mut self,
        lba: u64,
        src_sector_offset: usize,
        count: usize,
    ) -> Result<()> {
        if !self.good {
            return Err(Error::failed_precondition(
                "sector writer is in a failed state",
            ));
        }
        let start = src_sector_offset * SECTOR_SIZE;
        let end = start + count * SECTOR_SIZE;
        assert!(end <= self.scratch_len, "write exceeds the scratch buffer");

        let pos = (self.origin_lba + lba) * SECTOR_SIZE as u64;
        let result = self
            .file
            .seek(SeekFrom::Start(pos))
            .and_then(|_| self.file.write_all(&self.scratch[start..end]));
        if let Err(e) = result {
            self.good = false;
            return Err(Error::internal(format!(
                "sector write at lba {} failed: {}",
                lba, e
            )));
        }
        Ok(())
    }

    /// Like "dd": zero-fills the whole image, one blank sector at a time.
    pub fn blank_image(&mut self) -> Result<()> {
        info!(
            "creating blank image of {} {}-byte sectors",
            self.total_sectors, SECTOR_SIZE
        );
        let result = self.file.seek(SeekFrom::Start(0)).and_then(|_| {
            io::copy(
                &mut io::repeat(0).take(self.total_sectors * SECTOR_SIZE as u64),
                &mut self.file,
            )
        });
        if let Err(e) = result {
            self.good = false;
            return Err(Error::internal(format!("blank image fill failed: {}", e)));
        }
        Ok(())
    }

    /// Flushes buffered data to the backing file.
    pub fn flush(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| Error::internal(format!("image flush failed: {}", e)))
    }
}
