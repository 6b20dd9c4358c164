//! The filesystem abstraction the filesystem engines run on.
//!
//! Paths are relative, `/`-separated strings; the empty path is the root.
//! [`DiskFs`] maps them below a real directory and [`MemFs`] keeps
//! everything in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fakes3_core::{SystemTimeSource, TimeSource};
use parking_lot::Mutex;

/// Attributes of a file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Whether this is a directory.
    pub is_dir: bool,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, without its directory.
    pub name: String,
    /// Entry attributes.
    pub stat: FileStat,
}

/// A readable, seekable file handle.
pub trait FileReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> FileReader for T {}

/// Minimal filesystem interface.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Attributes of `path`. Missing paths fail with `NotFound`.
    fn stat(&self, path: &str) -> io::Result<FileStat>;

    /// Entries of a directory, sorted by name.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &str) -> io::Result<()>;

    /// Open a file for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn FileReader>>;

    /// Create or replace a file with `data`. The parent must exist.
    ///
    /// Readers opened before the call keep seeing the previous contents.
    fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &str) -> io::Result<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> io::Result<()>;

    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &str) -> io::Result<()>;
}

/// Join relative path segments, skipping empty ones.
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a relative path; the root for top-level entries.
pub fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file or directory"))
}

// ---------------------------------------------------------------------------
// DiskFs
// ---------------------------------------------------------------------------

/// Name prefix of the scratch files [`DiskFs::write`] renames into place.
pub const TEMP_PREFIX: &str = ".fakes3-tmp";

/// A directory on the local disk.
///
/// Every path is resolved below the root; segments that would escape it are
/// refused, and the root itself may not be the filesystem root.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    /// Use `root`, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        if root.parent().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to use {} as a storage root", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// The canonical root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> io::Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in rel.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{rel}: path escapes the storage root"),
                ));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

fn disk_stat(meta: &fs::Metadata) -> io::Result<FileStat> {
    Ok(FileStat {
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified()?.into(),
        is_dir: meta.is_dir(),
    })
}

impl FileSystem for DiskFs {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        disk_stat(&fs::metadata(self.resolve(path)?)?)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            entries.push(DirEntry {
                name,
                stat: disk_stat(&entry.metadata()?)?,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)?)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn FileReader>> {
        Ok(Box::new(fs::File::open(self.resolve(path)?)?))
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        let dir = target.parent().unwrap_or(&self.root);
        // Replace by rename so open handles keep the old inode.
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?)
    }

    fn remove_dir_all(&self, path: &str) -> io::Result<()> {
        fs::remove_dir_all(self.resolve(path)?)
    }
}

// ---------------------------------------------------------------------------
// MemFs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Dir { modified: DateTime<Utc> },
    File { data: Bytes, modified: DateTime<Utc> },
}

impl Node {
    fn stat(&self) -> FileStat {
        match self {
            Self::Dir { modified } => FileStat {
                size: 0,
                modified: *modified,
                is_dir: true,
            },
            Self::File { data, modified } => FileStat {
                size: data.len() as u64,
                modified: *modified,
                is_dir: false,
            },
        }
    }
}

/// An in-memory filesystem.
#[derive(Debug)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<String, Node>>,
    time: Arc<dyn TimeSource>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// An empty filesystem on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    /// An empty filesystem stamping modifications with `time`.
    #[must_use]
    pub fn with_time_source(time: Arc<dyn TimeSource>) -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            time,
        }
    }

    fn key(path: &str) -> String {
        join(&[path])
    }

    fn require_dir(nodes: &BTreeMap<String, Node>, path: &str) -> io::Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        match nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{path}: not a directory"),
            )),
            None => Err(not_found(path)),
        }
    }

    fn children<'a>(
        nodes: &'a BTreeMap<String, Node>,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
        let lower = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        nodes
            .range(lower.clone()..)
            .take_while(move |(k, _)| k.starts_with(&lower))
    }
}

impl FileSystem for MemFs {
    fn stat(&self, path: &str) -> io::Result<FileStat> {
        let path = Self::key(path);
        if path.is_empty() {
            return Ok(FileStat {
                size: 0,
                modified: self.time.now(),
                is_dir: true,
            });
        }
        self.nodes
            .lock()
            .get(&path)
            .map(Node::stat)
            .ok_or_else(|| not_found(&path))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = Self::key(path);
        let nodes = self.nodes.lock();
        Self::require_dir(&nodes, &path)?;
        let skip = if path.is_empty() { 0 } else { path.len() + 1 };
        Ok(Self::children(&nodes, &path)
            .filter(|(k, _)| !k[skip..].contains('/'))
            .map(|(k, node)| DirEntry {
                name: k[skip..].to_owned(),
                stat: node.stat(),
            })
            .collect())
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        let path = Self::key(path);
        let now = self.time.now();
        let mut nodes = self.nodes.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("{current}: not a directory"),
                    ));
                }
                None => {
                    nodes.insert(current.clone(), Node::Dir { modified: now });
                }
            }
        }
        Ok(())
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn FileReader>> {
        let path = Self::key(path);
        match self.nodes.lock().get(&path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{path}: is a directory"),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let path = Self::key(path);
        let now = self.time.now();
        let mut nodes = self.nodes.lock();
        Self::require_dir(&nodes, parent(&path))?;
        if let Some(Node::Dir { .. }) = nodes.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{path}: is a directory"),
            ));
        }
        nodes.insert(
            path,
            Node::File {
                data: Bytes::copy_from_slice(data),
                modified: now,
            },
        );
        Ok(())
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        let path = Self::key(path);
        let mut nodes = self.nodes.lock();
        match nodes.get(&path) {
            Some(Node::File { .. }) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{path}: is a directory"),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        let path = Self::key(path);
        let mut nodes = self.nodes.lock();
        Self::require_dir(&nodes, &path)?;
        if Self::children(&nodes, &path).next().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{path}: directory not empty"),
            ));
        }
        nodes.remove(&path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> io::Result<()> {
        let path = Self::key(path);
        let mut nodes = self.nodes.lock();
        Self::require_dir(&nodes, &path)?;
        let doomed: Vec<String> = Self::children(&nodes, &path).map(|(k, _)| k.clone()).collect();
        for key in doomed {
            nodes.remove(&key);
        }
        nodes.remove(&path);
        Ok(())
    }
}
