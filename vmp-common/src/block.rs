//! Block storage
//!
//! A [`BlockSource`] is a directory table: names resolve to numeric file
//! ids, and ids open [`BlockFile`]s. Ids stay valid for the lifetime of the
//! source so a file can be re-opened without another name lookup.
//!
//! Two sources are provided:
//! - [`DirectorySource`]: a filesystem directory read like a CD directory
//!   table (ids assigned in sorted name order, starting at 2)
//! - [`MemorySource`]: named in-memory blobs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage sector size in bytes
pub const SECTOR_SIZE: u64 = 2048;

/// First id handed out by a directory table (0 and 1 are `.` and `..`)
pub const FIRST_FILE_ID: u32 = 2;

/// Numeric file identifier within a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directory entry of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub id: FileId,
    /// Size in bytes
    pub size: u64,
    /// Attribute bits (0 for plain files)
    pub attributes: u8,
}

impl FileInfo {
    /// Number of sectors the file occupies
    pub fn sector_count(&self) -> u64 {
        self.size.div_ceil(SECTOR_SIZE)
    }
}

/// An open file; closed when dropped
pub trait BlockFile: Send {
    fn info(&self) -> FileInfo;

    /// Read up to `buf.len()` bytes at the access pointer and advance it
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the access pointer
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Current access pointer
    fn position(&self) -> u64;

    /// True once the access pointer has reached the end of the file
    fn at_end(&self) -> bool {
        self.position() >= self.info().size
    }
}

/// Name → id → file capability
pub trait BlockSource: Send + Sync {
    /// Look up a file by name
    fn resolve(&self, name: &str) -> Option<FileId>;

    /// Open a file by id
    fn open(&self, id: FileId) -> io::Result<Box<dyn BlockFile>>;

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

// ============================================================================
// Generic file over any reader
// ============================================================================

struct ReaderFile<R> {
    info: FileInfo,
    reader: R,
    position: u64,
}

impl<R: io::Read + io::Seek + Send> BlockFile for ReaderFile<R> {
    fn info(&self) -> FileInfo {
        self.info
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = io::Read::read(&mut self.reader, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = io::Seek::seek(&mut self.reader, pos)?;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

// ============================================================================
// Directory source
// ============================================================================

/// Filesystem directory exposed as a directory table
///
/// The table is read once at construction; files added later are not seen.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    /// Upper-cased name → (id, path)
    entries: BTreeMap<String, (FileId, PathBuf)>,
}

impl DirectorySource {
    /// Read the directory table of `root` (regular files only)
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut names = Vec::new();

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push((name.to_uppercase(), entry.path())),
                Err(raw) => warn!("Skipping non UTF-8 file name {:?}", raw),
            }
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let entries = names
            .into_iter()
            .enumerate()
            .map(|(index, (name, path))| (name, (FileId(FIRST_FILE_ID + index as u32), path)))
            .collect::<BTreeMap<_, _>>();

        debug!("Directory table for {:?}: {} files", root, entries.len());
        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn path_of(&self, id: FileId) -> Option<&Path> {
        self.entries
            .values()
            .find(|(fid, _)| *fid == id)
            .map(|(_, path)| path.as_path())
    }
}

impl BlockSource for DirectorySource {
    fn resolve(&self, name: &str) -> Option<FileId> {
        self.entries.get(&name.to_uppercase()).map(|(id, _)| *id)
    }

    fn open(&self, id: FileId) -> io::Result<Box<dyn BlockFile>> {
        let path = self.path_of(id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no file with id {}", id))
        })?;
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(ReaderFile {
            info: FileInfo {
                id,
                size,
                attributes: 0,
            },
            reader: file,
            position: 0,
        }))
    }
}

// ============================================================================
// Memory source
// ============================================================================

/// Named in-memory blobs
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: BTreeMap<String, (FileId, Arc<[u8]>)>,
    next_id: u32,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: FIRST_FILE_ID,
        }
    }

    /// Add (or replace) a blob; returns its id
    pub fn insert(&mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> FileId {
        let key = name.to_uppercase();
        let id = match self.entries.get(&key) {
            Some((id, _)) => *id,
            None => {
                let id = FileId(self.next_id.max(FIRST_FILE_ID));
                self.next_id = id.0 + 1;
                id
            }
        };
        self.entries.insert(key, (id, bytes.into()));
        id
    }

    /// Builder form of [`MemorySource::insert`]
    pub fn with_file(mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl BlockSource for MemorySource {
    fn resolve(&self, name: &str) -> Option<FileId> {
        self.entries.get(&name.to_uppercase()).map(|(id, _)| *id)
    }

    fn open(&self, id: FileId) -> io::Result<Box<dyn BlockFile>> {
        let bytes = self
            .entries
            .values()
            .find(|(fid, _)| *fid == id)
            .map(|(_, bytes)| Arc::clone(bytes))
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no file with id {}", id))
            })?;
        Ok(Box::new(ReaderFile {
            info: FileInfo {
                id,
                size: bytes.len() as u64,
                attributes: 0,
            },
            reader: Cursor::new(bytes),
            position: 0,
        }))
    }
}
