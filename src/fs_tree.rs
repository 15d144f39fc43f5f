// espmak/src/fs_tree.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::Options;

/// FAT 8.3 short names are 11 bytes: 8 stem bytes then 3 extension bytes,
/// space padded.
pub const SHORT_NAME_LEN: usize = 11;

const SHORT_STEM_LEN: usize = 8;
const SHORT_EXT_LEN: usize = 3;

/// Per-directory bookkeeping bytes used when sizing the output image.
const DIRECTORY_OVERHEAD_BYTES: u64 = 512;

/// Index of a directory node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirId(usize);

/// Index of a file node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(usize);

/// A named directory entry: either a sub-directory or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryId {
    Dir(DirId),
    File(FileId),
}

/// The root directory of every tree.
pub const ROOT: DirId = DirId(0);

#[derive(Debug)]
struct DirNode {
    parent: DirId,
    children: BTreeMap<String, EntryId>,
    start_cluster: u32,
}

#[derive(Debug)]
struct FileNode {
    #[allow(dead_code)]
    parent: DirId,
    data: Vec<u8>,
    start_cluster: u32,
}

/// In-memory directory tree to be laid out on the FAT volume.
///
/// Nodes live in dense arenas and refer to each other by index, so the
/// parent back-references never form ownership cycles. Children are kept in
/// a `BTreeMap`, which fixes the emission order to the lexicographic order
/// of the normalized names.
#[derive(Debug)]
pub struct FsTree {
    dirs: Vec<DirNode>,
    files: Vec<FileNode>,
    content_bytes: u64,
    preserve_case: bool,
}

impl FsTree {
    pub fn new(options: &Options) -> Self {
        Self {
            dirs: vec![DirNode {
                parent: ROOT,
                children: BTreeMap::new(),
                start_cluster: 0,
            }],
            files: Vec::new(),
            content_bytes: 0,
            preserve_case: options.preserve_case,
        }
    }

    /// Builds a tree from a host directory. The source directory itself
    /// becomes a top-level directory of the volume, named after its final
    /// path component.
    pub fn create_from_source(source: &Path, options: &Options) -> Result<Self> {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "source path {} has no usable directory name",
                    source.display()
                ))
            })?
            .to_string();

        let mut tree = Self::new(options);
        let top = tree.create_directory(ROOT, &name)?;
        tree.populate_from_source(top, source)?;
        Ok(tree)
    }

    /// Walks a host directory into `parent`, depth first.
    ///
    /// The walk keeps an explicit stack of `(parent, iterator)` pairs so the
    /// parent directory is restored when a sub-directory is exhausted; a
    /// plain recursive iterator would lose that context.
    pub fn populate_from_source(&mut self, parent: DirId, source: &Path) -> Result<()> {
        let mut stack: Vec<(DirId, fs::ReadDir)> = Vec::new();
        let mut parent = parent;
        let mut iter = read_dir(source)?;

        loop {
            match iter.next() {
                Some(entry) => {
                    let entry = entry.map_err(|e| {
                        Error::unavailable(format!(
                            "cannot read directory entry under {}: {}",
                            source.display(),
                            e
                        ))
                    })?;
                    let path = entry.path();
                    let name = entry.file_name();
                    let name = name.to_str().ok_or_else(|| {
                        Error::invalid_argument(format!(
                            "source name {:?} is not valid unicode",
                            entry.file_name()
                        ))
                    })?;
                    let metadata = fs::metadata(&path).map_err(|e| {
                        Error::unavailable(format!("cannot stat {}: {}", path.display(), e))
                    })?;

                    if metadata.is_dir() {
                        let dir = self.create_directory(parent, name)?;
                        // advance past the entry before descending
                        stack.push((parent, iter));
                        parent = dir;
                        iter = read_dir(&path)?;
                    } else {
                        let data = fs::read(&path).map_err(|e| {
                            Error::unavailable(format!("cannot read {}: {}", path.display(), e))
                        })?;
                        self.create_file(parent, name, data)?;
                    }
                }
                None => match stack.pop() {
                    Some((restored_parent, restored_iter)) => {
                        parent = restored_parent;
                        iter = restored_iter;
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }

    /// Creates a directory under `parent`. The name is normalized (8.3
    /// short-name rules, uppercased unless `preserve_case`) and must be
    /// unique within the parent after normalization.
    pub fn create_directory(&mut self, parent: DirId, name: &str) -> Result<DirId> {
        let name = self.normalize(name)?;
        self.check_unique(parent, &name)?;

        let id = DirId(self.dirs.len());
        self.dirs.push(DirNode {
            parent,
            children: BTreeMap::new(),
            start_cluster: 0,
        });
        self.dirs[parent.0].children.insert(name, EntryId::Dir(id));
        self.content_bytes += DIRECTORY_OVERHEAD_BYTES;
        Ok(id)
    }

    /// Creates a file under `parent` holding `data`.
    pub fn create_file(&mut self, parent: DirId, name: &str, data: Vec<u8>) -> Result<FileId> {
        let name = self.normalize(name)?;
        self.check_unique(parent, &name)?;

        let id = FileId(self.files.len());
        self.content_bytes += data.len() as u64;
        self.files.push(FileNode {
            parent,
            data,
            start_cluster: 0,
        });
        self.dirs[parent.0]
            .children
            .insert(name, EntryId::File(id));
        Ok(id)
    }

    /// Lower bound on the bytes the tree needs on disk: file contents plus a
    /// fixed per-directory overhead.
    pub fn content_bytes(&self) -> u64 {
        self.content_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.dirs[ROOT.0].children.is_empty()
    }

    pub fn children(&self, dir: DirId) -> &BTreeMap<String, EntryId> {
        &self.dirs[dir.0].children
    }

    pub fn child_count(&self, dir: DirId) -> usize {
        self.dirs[dir.0].children.len()
    }

    pub fn dir_parent(&self, dir: DirId) -> DirId {
        self.dirs[dir.0].parent
    }

    pub fn dir_start_cluster(&self, dir: DirId) -> u32 {
        self.dirs[dir.0].start_cluster
    }

    pub fn set_dir_start_cluster(&mut self, dir: DirId, cluster: u32) {
        self.dirs[dir.0].start_cluster = cluster;
    }

    pub fn file_start_cluster(&self, file: FileId) -> u32 {
        self.files[file.0].start_cluster
    }

    pub fn set_file_start_cluster(&mut self, file: FileId, cluster: u32) {
        self.files[file.0].start_cluster = cluster;
    }

    pub fn file_data(&self, file: FileId) -> &[u8] {
        &self.files[file.0].data
    }

    pub fn file_size(&self, file: FileId) -> u64 {
        self.files[file.0].data.len() as u64
    }

    /// Logs the tree at debug level, one entry per line, indented by depth.
    pub fn dump_contents(&self) {
        self.dump_dir(ROOT, 0);
    }

    fn dump_dir(&self, dir: DirId, depth: usize) {
        let pad = " ".repeat(depth * 4);
        for (name, entry) in self.children(dir) {
            match entry {
                EntryId::Dir(sub) => {
                    debug!("{}{}/", pad, name);
                    self.dump_dir(*sub, depth + 1);
                }
                EntryId::File(file) => {
                    debug!("{}{} ({} bytes)", pad, name, self.file_size(*file));
                }
            }
        }
    }

    fn normalize(&self, name: &str) -> Result<String> {
        let name = if self.preserve_case {
            name.to_string()
        } else {
            name.to_ascii_uppercase()
        };
        validate_entry_name(&name)?;
        Ok(name)
    }

    fn check_unique(&self, parent: DirId, name: &str) -> Result<()> {
        if self.dirs[parent.0].children.contains_key(name) {
            return Err(Error::already_exists(format!(
                "duplicate directory entry \"{}\"",
                name
            )));
        }
        Ok(())
    }
}

/// Checks that a (normalized) name is expressible as a FAT 8.3 short name:
/// ASCII, no embedded spaces, at most one dot, stem of 1..=8 bytes and an
/// extension of 1..=3 bytes when present.
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.is_ascii() || name.contains(' ') {
        return Err(Error::invalid_argument(format!(
            "name \"{}\" is not a plain ASCII 8.3 name",
            name
        )));
    }
    let mut parts = name.split('.');
    let stem = parts.next().unwrap_or("");
    let ext = parts.next();
    if parts.next().is_some() {
        return Err(Error::invalid_argument(format!(
            "name \"{}\" has more than one dot",
            name
        )));
    }
    if stem.is_empty() || stem.len() > SHORT_STEM_LEN {
        return Err(Error::invalid_argument(format!(
            "name stem of \"{}\" must be 1 to {} characters",
            name, SHORT_STEM_LEN
        )));
    }
    if let Some(ext) = ext {
        if ext.is_empty() || ext.len() > SHORT_EXT_LEN {
            return Err(Error::invalid_argument(format!(
                "name extension of \"{}\" must be 1 to {} characters",
                name, SHORT_EXT_LEN
            )));
        }
    }
    Ok(())
}

/// Converts a validated entry name to its on-disk short-name bytes:
/// `"FOO.BAR"` becomes `b"FOO     BAR"`.
pub fn short_name(name: &str) -> [u8; SHORT_NAME_LEN] {
    let mut out = [b' '; SHORT_NAME_LEN];
    let (stem, ext) = match name.split_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };
    out[..stem.len()].copy_from_slice(stem.as_bytes());
    out[SHORT_STEM_LEN..SHORT_STEM_LEN + ext.len()].copy_from_slice(ext.as_bytes());
    out
}

fn read_dir(path: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(path)
        .map_err(|e| Error::unavailable(format!("cannot open directory {}: {}", path.display(), e)))
}
